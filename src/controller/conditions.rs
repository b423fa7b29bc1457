//! Condition management helpers for Application status

use crate::crd::{ApplicationCondition, ApplicationConditionType};

/// Update or add a condition, unique by type. The latest message wins.
pub fn set_condition(conditions: &mut Vec<ApplicationCondition>, condition: ApplicationCondition) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

pub fn find_condition<'a>(
    conditions: &'a [ApplicationCondition],
    condition_type: ApplicationConditionType,
) -> Option<&'a ApplicationCondition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

pub fn remove_condition(
    conditions: &mut Vec<ApplicationCondition>,
    condition_type: ApplicationConditionType,
) {
    conditions.retain(|c| c.condition_type != condition_type);
}

pub fn has_error_condition(conditions: &[ApplicationCondition]) -> bool {
    conditions.iter().any(|c| c.is_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_adds_new() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            ApplicationCondition::new(ApplicationConditionType::ManifestError, "bad manifest"),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].condition_type,
            ApplicationConditionType::ManifestError
        );
    }

    #[test]
    fn test_set_condition_updates_existing() {
        let mut conditions = vec![ApplicationCondition::new(
            ApplicationConditionType::SyncError,
            "first failure",
        )];
        set_condition(
            &mut conditions,
            ApplicationCondition::new(ApplicationConditionType::SyncError, "second failure"),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].message, "second failure");
    }

    #[test]
    fn test_find_and_remove_condition() {
        let mut conditions = vec![
            ApplicationCondition::new(ApplicationConditionType::ManifestError, "x"),
            ApplicationCondition::new(ApplicationConditionType::SyncError, "y"),
        ];
        assert!(find_condition(&conditions, ApplicationConditionType::ManifestError).is_some());
        remove_condition(&mut conditions, ApplicationConditionType::ManifestError);
        assert!(find_condition(&conditions, ApplicationConditionType::ManifestError).is_none());
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_has_error_condition() {
        let conditions = vec![ApplicationCondition::new(
            ApplicationConditionType::SyncError,
            "auto-sync suppressed",
        )];
        // SyncError is informational, not a comparison-blocking error
        assert!(!has_error_condition(&conditions));
    }
}
