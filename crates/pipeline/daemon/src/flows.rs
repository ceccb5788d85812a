//! Flow definitions loaded from disk at startup

use crate::error::{DaemonError, DaemonResult};
use pipeline_engine::FlowCatalog;
use pipeline_types::FlowDefinition;
use std::path::{Path, PathBuf};

/// Register every `*.json` flow definition found directly under `dir`.
///
/// Files are read in name order. Returns the number of newly registered
/// flow versions.
pub fn load_flow_dir(catalog: &FlowCatalog, dir: &Path) -> DaemonResult<usize> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut registered = 0;
    for path in paths {
        let raw = std::fs::read_to_string(&path)?;
        let definition: FlowDefinition =
            serde_json::from_str(&raw).map_err(|e| DaemonError::Flow {
                path: path.clone(),
                detail: e.to_string(),
            })?;

        let flow_id = definition.flow_id.clone();
        let version = definition.version;
        if catalog.register(definition)? {
            registered += 1;
            tracing::info!(flow_id = %flow_id, version, path = %path.display(), "Flow registered");
        } else {
            tracing::warn!(flow_id = %flow_id, version, path = %path.display(), "Duplicate flow version ignored");
        }
    }
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_types::{FlowId, FlowNode};

    #[test]
    fn test_load_flow_dir() {
        let dir = tempfile::tempdir().unwrap();
        let flow = FlowDefinition::new("review", 2, "Review")
            .with_node(FlowNode::new("n-draft", "draft"))
            .with_node(FlowNode::new("n-check", "check").after("draft"));
        std::fs::write(
            dir.path().join("review.json"),
            serde_json::to_string(&flow).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("README.txt"), "not a flow").unwrap();

        let catalog = FlowCatalog::new();
        assert_eq!(load_flow_dir(&catalog, dir.path()).unwrap(), 1);
        assert_eq!(catalog.latest_version(&FlowId::new("review")), Some(2));

        // loading again registers nothing new
        assert_eq!(load_flow_dir(&catalog, dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_malformed_flow_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ \"flow_id\": ").unwrap();

        let err = load_flow_dir(&FlowCatalog::new(), dir.path()).unwrap_err();
        assert!(matches!(err, DaemonError::Flow { .. }));
    }
}
