//! Lifecycle hook recognition and health inference
//!
//! A hook is a desired resource annotated to run at a phase boundary instead
//! of during the ordinary apply waves. The sync engine creates hook resources
//! when their phase begins, polls them until they complete, and deletes them
//! per their deletion policy.

use serde_json::Value;
use std::str::FromStr;

use super::resource_meta::get_annotation;
use crate::crd::{HookDeletePolicy, HookType, OperationPhase};

/// Annotation binding an object to one or more hook phases, comma-separated.
pub const HOOK_ANNOTATION: &str = "windlass.io/hook";

/// Annotation selecting when the engine deletes a hook resource it created.
pub const HOOK_DELETE_POLICY_ANNOTATION: &str = "windlass.io/hook-delete-policy";

/// True when the object is annotated to run at any phase boundary, including
/// `Skip` (which excludes it from sync entirely).
pub fn is_hook(obj: &Value) -> bool {
    !hook_types(obj).is_empty()
        || get_annotation(obj, HOOK_ANNOTATION).is_some_and(|raw| {
            raw.split(',')
                .any(|t| HookType::from_str(t.trim()) == Ok(HookType::Skip))
        })
}

/// The hook phases an object is bound to. Unrecognized values are ignored;
/// `Skip` never yields a runnable phase.
pub fn hook_types(obj: &Value) -> Vec<HookType> {
    let Some(raw) = get_annotation(obj, HOOK_ANNOTATION) else {
        return Vec::new();
    };
    let mut types: Vec<HookType> = raw
        .split(',')
        .filter_map(|t| HookType::from_str(t.trim()).ok())
        .filter(|t| *t != HookType::Skip)
        .collect();
    types.dedup();
    types
}

pub fn hook_delete_policies(obj: &Value) -> Vec<HookDeletePolicy> {
    let Some(raw) = get_annotation(obj, HOOK_DELETE_POLICY_ANNOTATION) else {
        return Vec::new();
    };
    raw.split(',')
        .filter_map(|p| HookDeletePolicy::from_str(p.trim()).ok())
        .collect()
}

/// Infer a hook's phase from its live object.
///
/// Jobs complete through `status.succeeded` / `status.failed`, Pods through
/// `status.phase`. Any other kind has no completion signal we can observe and
/// counts as succeeded once created.
pub fn infer_hook_phase(live: &Value) -> (OperationPhase, String) {
    match super::resource_meta::kind_of(live) {
        "Job" => {
            let conditions = live
                .pointer("/status/conditions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let failed_message = conditions
                .iter()
                .find(|c| c.get("type").and_then(Value::as_str) == Some("Failed"))
                .and_then(|c| c.get("message").and_then(Value::as_str))
                .unwrap_or("job failed")
                .to_string();
            if live
                .pointer("/status/failed")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                > 0
            {
                (OperationPhase::Failed, failed_message)
            } else if live
                .pointer("/status/succeeded")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                > 0
            {
                (OperationPhase::Succeeded, String::new())
            } else {
                (OperationPhase::Running, String::new())
            }
        }
        "Pod" => match live.pointer("/status/phase").and_then(Value::as_str) {
            Some("Succeeded") => (OperationPhase::Succeeded, String::new()),
            Some("Failed") => {
                let message = live
                    .pointer("/status/message")
                    .and_then(Value::as_str)
                    .unwrap_or("pod failed")
                    .to_string();
                (OperationPhase::Failed, message)
            }
            _ => (OperationPhase::Running, String::new()),
        },
        _ => (OperationPhase::Succeeded, String::new()),
    }
}
