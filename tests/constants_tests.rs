// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use watchpost::constants::MotionSensitivity;
use watchpost::constants::categories::category_for_label;
use watchpost::constants::file_formats::is_image_extension;

#[test]
fn test_sensitivity_presets() {
    // Test that all presets exist (Low, Medium, High)
    assert_eq!(MotionSensitivity::ALL.len(), 3);
}

#[test]
fn test_sensitivity_ordering() {
    // More sensitive presets need fewer changed pixels
    let mut prev = f32::MAX;
    for preset in MotionSensitivity::ALL {
        let threshold = preset.motion_threshold();
        assert!(threshold < prev, "Presets should be ordered least to most sensitive");
        assert!(threshold > 0.0 && threshold < 1.0);
        prev = threshold;
    }
}

#[test]
fn test_sensitivity_from_name() {
    assert_eq!(MotionSensitivity::from_name("high"), Some(MotionSensitivity::High));
    assert_eq!(MotionSensitivity::from_name(" LOW "), Some(MotionSensitivity::Low));
    assert_eq!(MotionSensitivity::from_name("extreme"), None);
}

#[test]
fn test_label_categories() {
    assert_eq!(category_for_label("Car"), "vehicle");
    assert_eq!(category_for_label("human"), "person");
    assert_eq!(category_for_label("knife"), "weapon");
    // Unknown labels are their own category
    assert_eq!(category_for_label("Raccoon"), "raccoon");
}

#[test]
fn test_image_extensions() {
    assert!(is_image_extension("JPG"));
    assert!(is_image_extension("png"));
    assert!(!is_image_extension("mp4"));
}
