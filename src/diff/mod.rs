//! # Diff Engine
//!
//! Pure comparison of an observed cluster object against its desired template.
//!
//! The desired template defines which fields the operator manages: every field
//! it sets must be present and equal on the observed object. Fields that only
//! exist on the observed object (server defaults, fields owned by other actors)
//! are ignored, as are server-assigned metadata and `status`.
//!
//! Nothing in this module performs I/O.

use kube::api::DynamicObject;
use serde_json::{Map, Value};
use thiserror::Error;

/// Metadata fields assigned by the API server, never managed by the operator
pub const IGNORED_METADATA_FIELDS: &[&str] = &[
    "uid",
    "resourceVersion",
    "generation",
    "creationTimestamp",
    "managedFields",
    "selfLink",
    "deletionTimestamp",
    "deletionGracePeriodSeconds",
];

/// Top-level fields excluded from comparison
///
/// `apiVersion` and `kind` are part of the identity, `status` belongs to the
/// status subresource.
const IGNORED_TOP_LEVEL_FIELDS: &[&str] = &["apiVersion", "kind", "status"];

/// Payload maps owned wholesale, per core kind
///
/// Keys the desired object does not carry are stale and must be removed, so
/// these maps are compared and replaced as a whole instead of field by field.
const OWNED_MAPS: &[(&str, &[&str])] = &[
    ("Secret", &["data", "stringData"]),
    ("ConfigMap", &["data", "binaryData"]),
];

/// What the reconciler has to do to converge one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchDecision {
    Create,
    Update,
    NoOp,
}

impl PatchDecision {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchDecision::Create => "create",
            PatchDecision::Update => "update",
            PatchDecision::NoOp => "noop",
        }
    }
}

/// Managed fields whose observed value differs from the desired one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectDiff {
    /// Dotted paths, e.g. `spec.template.spec.containers[0].image`
    pub changed: Vec<String>,
}

impl ObjectDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("Malformed {side} object: {reason}")]
    Malformed { side: &'static str, reason: String },
    #[error("Observed object {observed} does not match desired object {desired}")]
    IdentityMismatch { observed: String, desired: String },
    #[error("Failed to convert object: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Decide how to converge `observed` toward `desired`
///
/// # Errors
///
/// Returns `DiffError` when either object is malformed or they do not share an identity.
pub fn decide(
    observed: Option<&DynamicObject>,
    desired: &DynamicObject,
) -> Result<PatchDecision, DiffError> {
    match observed {
        None => Ok(PatchDecision::Create),
        Some(observed) => {
            if compute_diff(observed, desired)?.is_empty() {
                Ok(PatchDecision::NoOp)
            } else {
                Ok(PatchDecision::Update)
            }
        }
    }
}

/// Structural diff restricted to the fields `desired` manages
///
/// # Errors
///
/// Returns `DiffError` when either object is malformed or they do not share an identity.
pub fn compute_diff(
    observed: &DynamicObject,
    desired: &DynamicObject,
) -> Result<ObjectDiff, DiffError> {
    check_identity(observed, desired)?;
    let owned = owned_maps(desired);
    let mut observed = snapshot(observed, "observed")?;
    let mut desired = snapshot(desired, "desired")?;

    let mut changed = Vec::new();
    for field in owned {
        let observed_map = take_map(&mut observed, field);
        let desired_map = take_map(&mut desired, field);
        if observed_map != desired_map {
            changed.push((*field).to_string());
        }
    }
    diff_value("", Some(&observed), &desired, &mut changed);
    Ok(ObjectDiff { changed })
}

/// Build the update payload: `observed` with every managed field taken from `desired`
///
/// Objects merge recursively; arrays and scalars are replaced wholesale, as
/// are the owned payload maps of Secrets and ConfigMaps. Unmanaged fields and
/// the observed `resourceVersion` are kept, so the update is rejected if the
/// object changed since it was read.
///
/// # Errors
///
/// Returns `DiffError` when either object is malformed or they do not share an identity.
pub fn merge_for_update(
    observed: &DynamicObject,
    desired: &DynamicObject,
) -> Result<DynamicObject, DiffError> {
    check_identity(observed, desired)?;
    let owned = owned_maps(desired);
    let mut merged = serde_json::to_value(observed)?;
    let desired = snapshot(desired, "desired")?;
    if !merged.is_object() {
        return Err(DiffError::Malformed {
            side: "observed",
            reason: "not a JSON object".to_string(),
        });
    }
    overlay(&mut merged, &desired);
    if let Some(map) = merged.as_object_mut() {
        for field in owned {
            match desired.get(*field).filter(|value| !value.is_null()) {
                Some(value) => map.insert((*field).to_string(), value.clone()),
                None => map.remove(*field),
            };
        }
    }
    // identity fields come from the observed object
    if let (Some(map), Some(types)) = (merged.as_object_mut(), &observed.types) {
        map.insert("apiVersion".to_string(), Value::String(types.api_version.clone()));
        map.insert("kind".to_string(), Value::String(types.kind.clone()));
    }
    Ok(serde_json::from_value(merged)?)
}

fn owned_maps(object: &DynamicObject) -> &'static [&'static str] {
    let Some(types) = object.types.as_ref().filter(|t| t.api_version == "v1") else {
        return &[];
    };
    OWNED_MAPS
        .iter()
        .find(|(kind, _)| *kind == types.kind)
        .map(|(_, fields)| *fields)
        .unwrap_or_default()
}

/// Remove `field` from a snapshot; absent, null and empty maps all read as empty
fn take_map(snapshot: &mut Value, field: &str) -> Map<String, Value> {
    match snapshot.as_object_mut().and_then(|map| map.remove(field)) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn check_identity(observed: &DynamicObject, desired: &DynamicObject) -> Result<(), DiffError> {
    let Some(desired_name) = desired.metadata.name.as_deref() else {
        return Err(DiffError::Malformed {
            side: "desired",
            reason: "metadata.name is not set".to_string(),
        });
    };
    let kinds_match = match (&observed.types, &desired.types) {
        (Some(observed), Some(desired)) => observed.kind == desired.kind,
        _ => true,
    };
    let namespaces_match = desired.metadata.namespace.is_none()
        || observed.metadata.namespace == desired.metadata.namespace;
    if kinds_match && namespaces_match && observed.metadata.name.as_deref() == Some(desired_name) {
        Ok(())
    } else {
        Err(DiffError::IdentityMismatch {
            observed: describe(observed),
            desired: describe(desired),
        })
    }
}

fn describe(object: &DynamicObject) -> String {
    format!(
        "{} {}/{}",
        object.types.as_ref().map_or("<unknown>", |t| t.kind.as_str()),
        object.metadata.namespace.as_deref().unwrap_or(""),
        object.metadata.name.as_deref().unwrap_or("<unnamed>")
    )
}

/// JSON view of an object without the ignored fields
fn snapshot(object: &DynamicObject, side: &'static str) -> Result<Value, DiffError> {
    let mut value = serde_json::to_value(object)?;
    let Some(map) = value.as_object_mut() else {
        return Err(DiffError::Malformed {
            side,
            reason: "not a JSON object".to_string(),
        });
    };
    for field in IGNORED_TOP_LEVEL_FIELDS {
        map.remove(*field);
    }
    if let Some(metadata) = map.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in IGNORED_METADATA_FIELDS {
            metadata.remove(*field);
        }
    }
    Ok(value)
}

fn diff_value(path: &str, observed: Option<&Value>, desired: &Value, changed: &mut Vec<String>) {
    match desired {
        Value::Null => {}
        Value::Object(desired_map) => match observed {
            Some(Value::Object(observed_map)) => {
                for (key, desired_child) in desired_map {
                    diff_value(
                        &child_path(path, key),
                        observed_map.get(key),
                        desired_child,
                        changed,
                    );
                }
            }
            None | Some(Value::Null) if is_effectively_empty(desired) => {}
            _ => changed.push(path.to_string()),
        },
        Value::Array(desired_items) => match observed {
            Some(Value::Array(observed_items)) if observed_items.len() == desired_items.len() => {
                for (index, (observed_item, desired_item)) in
                    observed_items.iter().zip(desired_items).enumerate()
                {
                    diff_value(
                        &format!("{path}[{index}]"),
                        Some(observed_item),
                        desired_item,
                        changed,
                    );
                }
            }
            None | Some(Value::Null) if desired_items.is_empty() => {}
            _ => changed.push(path.to_string()),
        },
        scalar => {
            if observed != Some(scalar) {
                changed.push(path.to_string());
            }
        }
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Null, or a map/list that holds nothing but nulls and empty containers
fn is_effectively_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.values().all(is_effectively_empty),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn overlay(target: &mut Value, desired: &Value) {
    if desired.is_null() {
        return;
    }
    match (target.as_object_mut(), desired.as_object()) {
        (Some(target_map), Some(desired_map)) => overlay_map(target_map, desired_map),
        _ => *target = desired.clone(),
    }
}

fn overlay_map(target: &mut Map<String, Value>, desired: &Map<String, Value>) {
    for (key, desired_child) in desired {
        if desired_child.is_null() {
            continue;
        }
        match target.get_mut(key) {
            Some(target_child) => overlay(target_child, desired_child),
            None => {
                target.insert(key.clone(), desired_child.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    fn desired_daemonset() -> DynamicObject {
        object(json!({
            "apiVersion": "apps/v1",
            "kind": "DaemonSet",
            "metadata": {
                "name": "csi-nodeplugin-nfsplugin",
                "namespace": "openshift-manila-csi-driver",
                "labels": {"app": "csi-nodeplugin-nfsplugin"}
            },
            "spec": {
                "template": {
                    "spec": {
                        "containers": [
                            {"name": "nfs", "image": "quay.io/nfs:v1"}
                        ]
                    }
                }
            }
        }))
    }

    /// Desired object as the server returns it: metadata, defaults and status added
    fn observed_daemonset(image: &str) -> DynamicObject {
        object(json!({
            "apiVersion": "apps/v1",
            "kind": "DaemonSet",
            "metadata": {
                "name": "csi-nodeplugin-nfsplugin",
                "namespace": "openshift-manila-csi-driver",
                "uid": "3f1c",
                "resourceVersion": "4711",
                "generation": 3,
                "creationTimestamp": "2024-01-01T00:00:00Z",
                "labels": {"app": "csi-nodeplugin-nfsplugin"},
                "annotations": {"deprecated.daemonset.template.generation": "3"}
            },
            "spec": {
                "revisionHistoryLimit": 10,
                "template": {
                    "spec": {
                        "containers": [
                            {
                                "name": "nfs",
                                "image": image,
                                "terminationMessagePath": "/dev/termination-log"
                            }
                        ],
                        "restartPolicy": "Always"
                    }
                }
            },
            "status": {"numberReady": 3}
        }))
    }

    #[test]
    fn test_absent_object_is_created() {
        assert_eq!(
            decide(None, &desired_daemonset()).unwrap(),
            PatchDecision::Create
        );
    }

    #[test]
    fn test_server_defaults_and_metadata_are_ignored() {
        let observed = observed_daemonset("quay.io/nfs:v1");
        let desired = desired_daemonset();

        assert!(compute_diff(&observed, &desired).unwrap().is_empty());
        assert_eq!(
            decide(Some(&observed), &desired).unwrap(),
            PatchDecision::NoOp
        );
    }

    #[test]
    fn test_changed_managed_field_reports_path() {
        let observed = observed_daemonset("quay.io/nfs:v0");
        let diff = compute_diff(&observed, &desired_daemonset()).unwrap();

        assert_eq!(diff.changed, vec!["spec.template.spec.containers[0].image"]);
        assert_eq!(
            decide(Some(&observed), &desired_daemonset()).unwrap(),
            PatchDecision::Update
        );
    }

    #[test]
    fn test_missing_label_and_extra_array_element_are_changes() {
        let mut observed = observed_daemonset("quay.io/nfs:v1");
        observed.metadata.labels = None;
        observed.data["spec"]["template"]["spec"]["containers"]
            .as_array_mut()
            .unwrap()
            .push(json!({"name": "sidecar"}));

        let diff = compute_diff(&observed, &desired_daemonset()).unwrap();
        assert_eq!(
            diff.changed,
            vec!["metadata.labels", "spec.template.spec.containers"]
        );
    }

    #[test]
    fn test_empty_desired_containers_match_absent_fields() {
        let desired = object(json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": {"name": "sa", "namespace": "ns", "annotations": {}},
            "secrets": []
        }));
        let observed = object(json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": {"name": "sa", "namespace": "ns", "uid": "1"}
        }));

        assert!(compute_diff(&observed, &desired).unwrap().is_empty());
    }

    #[test]
    fn test_merge_keeps_unmanaged_fields_and_resource_version() {
        let observed = observed_daemonset("quay.io/nfs:v0");
        let merged = merge_for_update(&observed, &desired_daemonset()).unwrap();

        assert_eq!(merged.metadata.resource_version.as_deref(), Some("4711"));
        assert_eq!(merged.data["spec"]["revisionHistoryLimit"], json!(10));
        assert_eq!(
            merged.data["spec"]["template"]["spec"]["containers"][0]["image"],
            json!("quay.io/nfs:v1")
        );
        assert_eq!(
            merged.metadata.annotations.as_ref().unwrap()["deprecated.daemonset.template.generation"],
            "3"
        );
        // Merging converges: the payload no longer differs from the template
        assert!(compute_diff(&merged, &desired_daemonset()).unwrap().is_empty());
    }

    fn driver_secret(data: Value) -> DynamicObject {
        object(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "csi-manila-secrets", "namespace": "openshift-manila-csi-driver"},
            "type": "Opaque",
            "data": data
        }))
    }

    #[test]
    fn test_stale_secret_key_is_a_change() {
        let desired = driver_secret(json!({"os-authURL": "aHR0cHM6Ly9r"}));
        let mut observed = driver_secret(json!({
            "os-authURL": "aHR0cHM6Ly9r",
            "os-password": "czNjcmV0"
        }));
        observed.metadata.uid = Some("9a1e".to_string());

        assert_eq!(compute_diff(&observed, &desired).unwrap().changed, vec!["data"]);
        assert!(compute_diff(&desired, &desired).unwrap().is_empty());
    }

    #[test]
    fn test_merge_replaces_owned_maps() {
        let desired = driver_secret(json!({"os-applicationCredentialID": "YWMtMQ=="}));
        let mut observed = driver_secret(json!({
            "os-userName": "bWFuaWxh",
            "os-password": "czNjcmV0"
        }));
        observed.metadata.resource_version = Some("12".to_string());

        let merged = merge_for_update(&observed, &desired).unwrap();

        assert_eq!(merged.data["data"], json!({"os-applicationCredentialID": "YWMtMQ=="}));
        assert_eq!(merged.metadata.resource_version.as_deref(), Some("12"));
        assert!(compute_diff(&merged, &desired).unwrap().is_empty());
    }

    #[test]
    fn test_config_map_without_desired_binary_data_drops_observed_one() {
        let desired = object(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cloud-provider-config", "namespace": "ns"},
            "data": {"ca-bundle.pem": "ca"}
        }));
        let mut observed = desired.clone();
        observed.data["binaryData"] = json!({"old": "AA=="});

        assert_eq!(
            compute_diff(&observed, &desired).unwrap().changed,
            vec!["binaryData"]
        );
        let merged = merge_for_update(&observed, &desired).unwrap();
        assert!(merged.data.get("binaryData").is_none());
    }

    #[test]
    fn test_identity_mismatch_is_an_error() {
        let mut observed = observed_daemonset("quay.io/nfs:v1");
        observed.metadata.name = Some("other".to_string());

        let err = compute_diff(&observed, &desired_daemonset()).unwrap_err();
        assert!(matches!(err, DiffError::IdentityMismatch { .. }));
    }

    #[test]
    fn test_unnamed_desired_object_is_malformed() {
        let mut desired = desired_daemonset();
        desired.metadata.name = None;

        let err = decide(Some(&observed_daemonset("x")), &desired).unwrap_err();
        assert!(matches!(err, DiffError::Malformed { side: "desired", .. }));
    }

    #[test]
    fn test_diff_is_deterministic() {
        let observed = observed_daemonset("quay.io/nfs:v0");
        let first = compute_diff(&observed, &desired_daemonset()).unwrap();
        let second = compute_diff(&observed, &desired_daemonset()).unwrap();
        assert_eq!(first, second);
    }
}
