//! Structural diffing of desired versus live objects
//!
//! Two modes. Two-way compares the desired object against live, reporting a
//! difference only on paths the desired object claims. Three-way additionally
//! consults the last-applied snapshot recorded on the live object, which lets
//! it distinguish cluster-defaulted fields (ignored) from managed fields the
//! user removed (reported).
//!
//! Both modes are built on JSON merge patches (RFC 7386): a patch is computed
//! from (recorded, desired, live), applied to the live object, and the result
//! compared against live. Arrays are atomic under merge-patch semantics, so
//! array entries compare positionally.

use serde_json::{Map, Value};

use super::normalize::{canonicalize_numbers, normalize, remove_namespace};
use super::resource_meta::{last_applied_config, namespace_of};
use crate::error::{Error, Result};

/// Outcome of diffing one (desired, live) pair.
///
/// Carries the live object and the form it would take if the desired state
/// were applied; an external formatter renders the delta for display. The
/// differ itself never fails: malformed input yields `modified = true` with a
/// diagnostic.
#[derive(Clone, Debug, Default)]
pub struct DiffResult {
    pub modified: bool,
    /// Set when the desired object was malformed or unparseable.
    pub diagnostic: Option<String>,
    /// Normalized live object, if present.
    pub live: Option<Value>,
    /// Live object with the desired state applied over it.
    pub predicted_live: Option<Value>,
}

impl DiffResult {
    pub fn modified(&self) -> bool {
        self.modified
    }

    fn malformed(err: &Error) -> DiffResult {
        DiffResult {
            modified: true,
            diagnostic: Some(err.to_string()),
            ..DiffResult::default()
        }
    }

    /// JSON-pointer paths at which predicted and live disagree, for display
    /// and messages. Removals show up as paths present in live only.
    pub fn changed_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_changed_paths(
            self.predicted_live.as_ref().unwrap_or(&Value::Null),
            self.live.as_ref().unwrap_or(&Value::Null),
            String::new(),
            &mut paths,
        );
        paths
    }
}

/// Aggregate result over a list of pairs.
#[derive(Clone, Debug, Default)]
pub struct BatchDiffResult {
    pub modified: bool,
    pub diffs: Vec<DiffResult>,
}

/// Diff a desired object against a live object, choosing three-way when the
/// live object records a last-applied snapshot.
///
/// An absent desired with a present live is not a difference here: the live
/// object may simply be unmanaged, and the comparator decides pruning from
/// ownership labels.
pub fn diff(target: Option<&Value>, live: Option<&Value>) -> DiffResult {
    match (target, live) {
        (None, _) => DiffResult {
            modified: false,
            live: live.cloned(),
            predicted_live: live.cloned(),
            ..DiffResult::default()
        },
        (Some(target), None) => match normalize(target) {
            Ok(mut normalized) => {
                canonicalize_numbers(&mut normalized);
                DiffResult {
                    modified: true,
                    predicted_live: Some(normalized),
                    ..DiffResult::default()
                }
            }
            Err(err) => DiffResult::malformed(&err),
        },
        (Some(target), Some(live)) => diff_objects(target, live),
    }
}

fn diff_objects(target: &Value, live: &Value) -> DiffResult {
    let mut target_norm = match normalize(target) {
        Ok(v) => v,
        Err(err) => return DiffResult::malformed(&err),
    };
    let mut live_norm = match normalize(live) {
        Ok(v) => v,
        Err(err) => return DiffResult::malformed(&err),
    };
    // Cluster-scoped live objects carry no namespace; ignore one the desired
    // object may declare.
    if namespace_of(live).is_none() {
        remove_namespace(&mut target_norm);
    }
    canonicalize_numbers(&mut target_norm);
    canonicalize_numbers(&mut live_norm);

    match recorded_config(live) {
        Some(Ok(mut recorded)) => {
            remove_namespace(&mut recorded);
            canonicalize_numbers(&mut recorded);
            three_way(&recorded, &target_norm, &live_norm)
        }
        Some(Err(err)) => DiffResult::malformed(&err),
        None => two_way(&target_norm, &live_norm),
    }
}

/// Two-way diff on normalized objects: desired versus live, reporting only
/// paths the desired object claims.
pub fn two_way_diff(target: Option<&Value>, live: Option<&Value>) -> DiffResult {
    match (target, live) {
        (None, _) => DiffResult {
            modified: false,
            live: live.cloned(),
            predicted_live: live.cloned(),
            ..DiffResult::default()
        },
        (Some(_), None) => diff(target, None),
        (Some(target), Some(live)) => {
            let mut target_norm = match normalize(target) {
                Ok(v) => v,
                Err(err) => return DiffResult::malformed(&err),
            };
            let mut live_norm = match normalize(live) {
                Ok(v) => v,
                Err(err) => return DiffResult::malformed(&err),
            };
            if namespace_of(live).is_none() {
                remove_namespace(&mut target_norm);
            }
            canonicalize_numbers(&mut target_norm);
            canonicalize_numbers(&mut live_norm);
            two_way(&target_norm, &live_norm)
        }
    }
}

/// Three-way diff on normalized objects, with an explicit recorded snapshot.
pub fn three_way_diff(recorded: &Value, target: &Value, live: &Value) -> DiffResult {
    three_way(recorded, target, live)
}

/// Diff a paired list. Both slices must have equal length; either member of a
/// pair may be `None`.
pub fn diff_array(targets: &[Option<Value>], lives: &[Option<Value>]) -> Result<BatchDiffResult> {
    if targets.len() != lives.len() {
        return Err(Error::ManifestError(format!(
            "cannot diff array: length mismatch ({} desired vs {} live)",
            targets.len(),
            lives.len()
        )));
    }
    let diffs: Vec<DiffResult> = targets
        .iter()
        .zip(lives.iter())
        .map(|(t, l)| diff(t.as_ref(), l.as_ref()))
        .collect();
    let modified = diffs.iter().any(|d| d.modified);
    Ok(BatchDiffResult { modified, diffs })
}

/// Two-way is three-way with the desired object standing in for the recorded
/// snapshot, which makes removals unobservable.
fn two_way(target: &Value, live: &Value) -> DiffResult {
    three_way(target, target, live)
}

fn three_way(recorded: &Value, target: &Value, live: &Value) -> DiffResult {
    let patch = build_patch(recorded, target, live);
    let predicted = apply_merge_patch(live, &patch);
    DiffResult {
        modified: predicted != *live,
        diagnostic: None,
        live: Some(live.clone()),
        predicted_live: Some(predicted),
    }
}

/// The three-way merge patch: additions and changes wherever desired differs
/// from live, plus deletions for paths the recorded snapshot claims but the
/// desired state dropped. Paths present only in live are cluster defaults and
/// stay untouched.
fn build_patch(recorded: &Value, target: &Value, live: &Value) -> Value {
    let add_and_change = without_nulls(create_merge_patch(live, target));
    let deletions = nulls_only(create_merge_patch(recorded, target));
    merge_patches(add_and_change, deletions)
}

/// RFC 7386 merge patch turning `base` into `target`. Removed keys map to
/// null; arrays are replaced wholesale.
fn create_merge_patch(base: &Value, target: &Value) -> Value {
    match (base, target) {
        (Value::Object(base_map), Value::Object(target_map)) => {
            let mut patch = Map::new();
            for (key, base_value) in base_map {
                match target_map.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(target_value) if target_value != base_value => {
                        patch.insert(key.clone(), create_merge_patch(base_value, target_value));
                    }
                    Some(_) => {}
                }
            }
            for (key, target_value) in target_map {
                if !base_map.contains_key(key) {
                    patch.insert(key.clone(), target_value.clone());
                }
            }
            Value::Object(patch)
        }
        _ => target.clone(),
    }
}

/// RFC 7386 application of a merge patch.
fn apply_merge_patch(base: &Value, patch: &Value) -> Value {
    match patch {
        Value::Object(patch_map) => {
            let mut out = match base {
                Value::Object(base_map) => base_map.clone(),
                _ => Map::new(),
            };
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    out.remove(key);
                } else {
                    let merged = match out.get(key) {
                        Some(existing) => apply_merge_patch(existing, patch_value),
                        None => apply_merge_patch(&Value::Null, patch_value),
                    };
                    out.insert(key.clone(), merged);
                }
            }
            Value::Object(out)
        }
        _ => patch.clone(),
    }
}

/// Strips null leaves, leaving only additions and changes.
fn without_nulls(patch: Value) -> Value {
    match patch {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, without_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Keeps only null leaves, the deletion half of a patch.
fn nulls_only(patch: Value) -> Value {
    match patch {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter_map(|(k, v)| match v {
                    Value::Null => Some((k, Value::Null)),
                    Value::Object(_) => match nulls_only(v) {
                        Value::Object(inner) if inner.is_empty() => None,
                        kept => Some((k, kept)),
                    },
                    _ => None,
                })
                .collect(),
        ),
        _ => Value::Object(Map::new()),
    }
}

fn merge_patches(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.remove(&key) {
                    Some(existing) => {
                        base_map.insert(key, merge_patches(existing, overlay_value));
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn recorded_config(live: &Value) -> Option<Result<Value>> {
    let raw = last_applied_config(live)?;
    match serde_json::from_str::<Value>(raw) {
        Ok(recorded) => match normalize(&recorded) {
            Ok(normalized) => Some(Ok(normalized)),
            Err(err) => Some(Err(err)),
        },
        Err(err) => Some(Err(Error::ManifestError(format!(
            "last-applied configuration annotation is unparseable: {err}"
        )))),
    }
}

fn collect_changed_paths(predicted: &Value, live: &Value, prefix: String, out: &mut Vec<String>) {
    match (predicted, live) {
        (Value::Object(p), Value::Object(l)) => {
            for (key, p_value) in p {
                let path = format!("{prefix}/{key}");
                match l.get(key) {
                    Some(l_value) => collect_changed_paths(p_value, l_value, path, out),
                    None => out.push(path),
                }
            }
            for key in l.keys() {
                if !p.contains_key(key) {
                    out.push(format!("{prefix}/{key}"));
                }
            }
        }
        (p, l) if p != l => out.push(if prefix.is_empty() { "/".into() } else { prefix }),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::resource_meta::KUBECTL_LAST_APPLIED_ANNOTATION;
    use serde_json::json;

    fn demo_deployment() -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "demo", "namespace": "default"},
            "spec": {
                "replicas": 1,
                "selector": {"matchLabels": {"app": "demo"}},
                "template": {
                    "metadata": {"labels": {"app": "demo"}},
                    "spec": {"containers": [{"name": "demo", "image": "demo:v1"}]}
                }
            }
        })
    }

    #[test]
    fn test_diff_reflexive() {
        let obj = demo_deployment();
        let res = diff(Some(&obj), Some(&obj));
        assert!(!res.modified());
        assert!(res.changed_paths().is_empty());
    }

    #[test]
    fn test_diff_with_nils() {
        let obj = demo_deployment();
        // live without desired is not a difference; the comparator decides
        // pruning from ownership labels
        assert!(!diff(None, Some(&obj)).modified());
        assert!(!two_way_diff(None, Some(&obj)).modified());
        // desired without live requires creation
        assert!(diff(Some(&obj), None).modified());
        assert!(two_way_diff(Some(&obj), None).modified());
    }

    #[test]
    fn test_diff_array_ignores_status_additions() {
        let target = demo_deployment();
        let mut live = demo_deployment();
        live["status"] = json!({"replicas": 1});
        let res = diff_array(
            &[Some(target)],
            &[Some(live)],
        )
        .unwrap();
        assert!(!res.modified);
    }

    #[test]
    fn test_diff_array_detects_modification() {
        let target = demo_deployment();
        let mut live = demo_deployment();
        live["spec"]["replicas"] = json!(10);
        let res = diff_array(&[Some(target)], &[Some(live)]).unwrap();
        assert!(res.modified);
    }

    #[test]
    fn test_diff_array_length_mismatch() {
        assert!(diff_array(&[None, None], &[None]).is_err());
    }

    #[test]
    fn test_numeric_round_trip_equal() {
        let target = json!({"apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "cm"}, "spec": {"port": 1234}});
        let live = json!({"apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "cm"}, "spec": {"port": 1234.0}});
        assert!(!diff(Some(&target), Some(&live)).modified());
    }

    #[test]
    fn test_three_way_ignores_defaulted_fields() {
        let mut target = demo_deployment();
        target["metadata"].as_object_mut().unwrap().remove("namespace");
        target["metadata"]["annotations"] = json!({"foo": "bar"});

        let mut live = target.clone();
        live["metadata"]["namespace"] = json!("default");
        live["metadata"]["annotations"][KUBECTL_LAST_APPLIED_ANNOTATION] =
            json!(target.to_string());
        // defaults the cluster added
        live["metadata"]["creationTimestamp"] = json!("2024-01-01T00:00:00Z");
        live["spec"]["revisionHistoryLimit"] = json!(10);

        assert!(!diff(Some(&target), Some(&live)).modified());
    }

    #[test]
    fn test_three_way_detects_removed_managed_field() {
        let mut recorded = demo_deployment();
        recorded["metadata"].as_object_mut().unwrap().remove("namespace");
        recorded["metadata"]["annotations"] = json!({"foo": "bar"});

        // user dropped the foo annotation from the desired state
        let mut target = recorded.clone();
        target["metadata"]
            .as_object_mut()
            .unwrap()
            .remove("annotations");

        let mut live = recorded.clone();
        live["metadata"]["namespace"] = json!("default");
        live["metadata"]["annotations"][KUBECTL_LAST_APPLIED_ANNOTATION] =
            json!(recorded.to_string());

        let res = diff(Some(&target), Some(&live));
        assert!(res.modified());
        assert!(res
            .changed_paths()
            .iter()
            .any(|p| p.starts_with("/metadata/annotations")));

        // without the snapshot there is no way to know foo was managed
        let mut live_no_annotation = live.clone();
        live_no_annotation["metadata"]["annotations"] = json!({"foo": "bar"});
        assert!(!diff(Some(&target), Some(&live_no_annotation)).modified());
    }

    #[test]
    fn test_three_way_detects_cluster_drift_on_managed_path() {
        let mut target = demo_deployment();
        target["metadata"].as_object_mut().unwrap().remove("namespace");

        let mut live = target.clone();
        live["metadata"]["annotations"] = json!({
            KUBECTL_LAST_APPLIED_ANNOTATION: target.to_string()
        });
        live["spec"]["replicas"] = json!(5);

        assert!(diff(Some(&target), Some(&live)).modified());
    }

    #[test]
    fn test_real_world_service_account() {
        // a real pairing: desired subset, live with server fields, defaults,
        // and a last-applied annotation
        let target: Value = serde_json::from_str(
            r#"{
              "apiVersion": "v1",
              "kind": "ServiceAccount",
              "metadata": {
                "labels": {"applications.windlass.io/app-name": "windlass-demo"},
                "name": "application-controller"
              }
            }"#,
        )
        .unwrap();
        let live: Value = serde_json::from_str(
            r#"{
              "apiVersion": "v1",
              "kind": "ServiceAccount",
              "metadata": {
                "annotations": {
                  "kubectl.kubernetes.io/last-applied-configuration": "{\"apiVersion\":\"v1\",\"kind\":\"ServiceAccount\",\"metadata\":{\"annotations\":{},\"labels\":{\"applications.windlass.io/app-name\":\"windlass-demo\"},\"name\":\"application-controller\",\"namespace\":\"windlass-demo\"}}\n"
                },
                "creationTimestamp": "2018-04-16T22:08:57Z",
                "labels": {"applications.windlass.io/app-name": "windlass-demo"},
                "name": "application-controller",
                "namespace": "windlass-demo",
                "resourceVersion": "7584502",
                "selfLink": "/api/v1/namespaces/windlass-demo/serviceaccounts/application-controller",
                "uid": "c22bb2b4-41c2-11e8-978a-028445d52ec8"
              },
              "secrets": [{"name": "application-controller-token-kfxct"}]
            }"#,
        )
        .unwrap();
        assert!(!diff(Some(&target), Some(&live)).modified());
    }

    #[test]
    fn test_cluster_scoped_namespace_ignored() {
        let target: Value = serde_yaml::from_str(
            r#"
apiVersion: foo.io/v1
kind: Foo
metadata:
  name: my-foo
  namespace: kube-system
spec:
  foo: bar
"#,
        )
        .unwrap();
        let live: Value = serde_yaml::from_str(
            r#"
apiVersion: foo.io/v1
kind: Foo
metadata:
  creationTimestamp: "2018-07-17T09:17:05Z"
  name: my-foo
  resourceVersion: "10308211"
  uid: 2c3d5405-89a2-11e8-aff0-42010a8a0fc6
spec:
  foo: bar
"#,
        )
        .unwrap();
        assert!(!diff(Some(&target), Some(&live)).modified());
    }

    #[test]
    fn test_secret_string_data_equivalence() {
        let target: Value = serde_yaml::from_str(
            r#"
apiVersion: v1
kind: Secret
metadata:
  name: my-secret
type: Opaque
stringData:
  foo: bar
  bar: "1234"
data:
  baz: cXV4
"#,
        )
        .unwrap();
        let live: Value = serde_yaml::from_str(
            r#"
apiVersion: v1
kind: Secret
metadata:
  creationTimestamp: "2018-11-19T11:30:40Z"
  name: my-secret
  namespace: windlass
  resourceVersion: "25848035"
  uid: 8b4a2766-ebee-11e8-93c0-42010a8a0013
type: Opaque
data:
  foo: YmFy
  bar: MTIzNA==
  baz: cXV4
"#,
        )
        .unwrap();
        assert!(!diff(Some(&target), Some(&live)).modified());
    }

    #[test]
    fn test_invalid_secret_string_data() {
        let target: Value = serde_yaml::from_str(
            r#"
apiVersion: v1
kind: Secret
metadata:
  name: my-secret
type: Opaque
stringData:
  foo: 1234
"#,
        )
        .unwrap();
        let res = diff(Some(&target), None);
        assert!(res.modified());
        assert!(res.diagnostic.is_some());
    }
}
