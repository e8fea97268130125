// SPDX-License-Identifier: GPL-3.0-only

//! Notification text for an alert

use crate::backends::notification::Message;
use crate::pipelines::types::Alert;
use std::fmt::Write;

pub fn compose(alert: &Alert) -> Message {
    let subject = format!("Security alert: {} detected", capitalize(&alert.category));

    let mut body = String::new();
    let _ = writeln!(body, "Security alert on camera {}", alert.camera_id);
    let _ = writeln!(body);
    let _ = writeln!(body, "Detected:");
    if alert.labels.is_empty() {
        let _ = writeln!(
            body,
            "  - {}: {:.1}%",
            capitalize(&alert.category),
            alert.confidence * 100.0
        );
    }
    for label in &alert.labels {
        let _ = writeln!(body, "  - {}: {:.1}%", label.name, label.confidence * 100.0);
    }
    let _ = writeln!(body);
    let _ = writeln!(body, "Image: {}", alert.image_ref);
    let _ = write!(
        body,
        "Time: {}",
        alert.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    Message {
        subject,
        body,
        attachment: Some(alert.image_ref.clone()),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
