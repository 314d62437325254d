//! ID generation utilities for Strandr
//!
//! Provides functions for generating unique identifiers for top-level tasks
//! and the subtasks they fan out into.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generate a unique id for a top-level task
///
/// Format: `task-{timestamp_ms}-{random_hex}`
/// Example: `task-1738300800123-a1b2`
pub fn generate_task_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("task-{}-{:04x}", timestamp, random)
}

/// Generate a child ID given parent and index
///
/// Format: `{parent_id}.{index:03}`
/// Example: For parent "task-1-a1b2" and index 2: "task-1-a1b2.002"
///
/// The full parent id is kept so a subtask id names its whole ancestry.
pub fn generate_child_id(parent_id: &str, index: u32) -> String {
    format!("{}.{:03}", parent_id, index)
}

/// Depth of a task in its tree (0 for a top-level task)
pub fn depth_of(task_id: &str) -> usize {
    task_id.matches('.').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_task_id_format() {
        let id = generate_task_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "task");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_child_id_format() {
        let child = generate_child_id("task-1-a1b2", 2);
        assert_eq!(child, "task-1-a1b2.002");
    }

    #[test]
    fn test_generate_child_id_nests() {
        let child = generate_child_id("root", 1);
        let grandchild = generate_child_id(&child, 12);
        assert_eq!(grandchild, "root.001.012");
        assert!(grandchild.starts_with(&child));
    }

    #[test]
    fn test_depth_of() {
        assert_eq!(depth_of("task-1-a1b2"), 0);
        assert_eq!(depth_of("task-1-a1b2.001"), 1);
        assert_eq!(depth_of("task-1-a1b2.001.004"), 2);
    }
}
