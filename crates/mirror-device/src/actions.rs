//! W3C pointer-action payloads for touch input through a session.

use std::time::Duration;

use mirror_types::geometry::DevicePoint;
use serde_json::{json, Value};

const POINTER_ID: &str = "finger1";
const TAP_HOLD: Duration = Duration::from_millis(50);

fn touch_sequence(steps: Vec<Value>) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": POINTER_ID,
            "parameters": { "pointerType": "touch" },
            "actions": steps,
        }]
    })
}

fn move_to(point: DevicePoint, duration: Duration) -> Value {
    json!({
        "type": "pointerMove",
        "duration": duration.as_millis() as u64,
        "x": point.x,
        "y": point.y,
    })
}

pub fn tap(at: DevicePoint) -> Value {
    touch_sequence(vec![
        move_to(at, Duration::ZERO),
        json!({ "type": "pointerDown", "button": 0 }),
        json!({ "type": "pause", "duration": TAP_HOLD.as_millis() as u64 }),
        json!({ "type": "pointerUp", "button": 0 }),
    ])
}

pub fn swipe(from: DevicePoint, to: DevicePoint, duration: Duration) -> Value {
    touch_sequence(vec![
        move_to(from, Duration::ZERO),
        json!({ "type": "pointerDown", "button": 0 }),
        move_to(to, duration),
        json!({ "type": "pointerUp", "button": 0 }),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_presses_and_releases_at_point() {
        let payload = tap(DevicePoint::new(120.5, 300.0));
        let steps = payload["actions"][0]["actions"]
            .as_array()
            .expect("action steps");
        assert_eq!(payload["actions"][0]["parameters"]["pointerType"], "touch");
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0]["x"], 120.5);
        assert_eq!(steps[0]["y"], 300.0);
        assert_eq!(steps[1]["type"], "pointerDown");
        assert_eq!(steps[3]["type"], "pointerUp");
    }

    #[test]
    fn swipe_moves_over_requested_duration() {
        let payload = swipe(
            DevicePoint::new(10.0, 700.0),
            DevicePoint::new(10.0, 100.0),
            Duration::from_millis(350),
        );
        let steps = payload["actions"][0]["actions"]
            .as_array()
            .expect("action steps");
        assert_eq!(steps[2]["type"], "pointerMove");
        assert_eq!(steps[2]["duration"], 350);
        assert_eq!(steps[2]["y"], 100.0);
    }
}
