use std::fs;
use std::path::Path;

use serde_yaml::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::datasources::{
    DatasourceDescriptor, DatasourceId, DatasourceKind, DiscoveryError, PreparedDatasource,
};
use crate::pluginlib::DatasourceType;
use crate::project::ProjectLayout;
use crate::templating::render_template;

const FILES_MAIN_TYPE: &str = "files";

/// Scan the project's `src/` directory and return all discovered sources,
/// sorted by relative path (case-insensitive).
pub fn discover_datasources(
    layout: &ProjectLayout,
) -> Result<Vec<DatasourceDescriptor>, DiscoveryError> {
    let src_dir = layout.src_dir();
    if !src_dir.is_dir() {
        return Err(DiscoveryError::SrcDirMissing(layout.project_dir.clone()));
    }

    let mut datasources = Vec::new();
    for entry in WalkDir::new(&src_dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(descriptor) = load_descriptor(&src_dir, entry.path())? {
            datasources.push(descriptor);
        }
    }

    datasources.sort_by_key(|d| d.datasource_id.as_str().to_lowercase());
    Ok(datasources)
}

/// Resolve explicit datasource ids into descriptors, failing on unknown ids.
pub fn get_datasource_descriptors(
    layout: &ProjectLayout,
    datasource_ids: &[DatasourceId],
) -> Result<Vec<DatasourceDescriptor>, DiscoveryError> {
    let src_dir = layout.src_dir();
    if !src_dir.is_dir() {
        return Err(DiscoveryError::SrcDirMissing(layout.project_dir.clone()));
    }

    let mut sorted_ids = datasource_ids.to_vec();
    sorted_ids.sort();

    let mut datasources = Vec::new();
    for datasource_id in sorted_ids {
        let config_file = src_dir.join(datasource_id.relative_path_to_config_file());
        if !config_file.is_file() {
            return Err(DiscoveryError::ConfigFileNotFound(config_file));
        }

        if let Some(descriptor) = load_descriptor(&src_dir, &config_file)? {
            datasources.push(descriptor);
        }
    }

    Ok(datasources)
}

fn load_descriptor(
    src_dir: &Path,
    path: &Path,
) -> Result<Option<DatasourceDescriptor>, DiscoveryError> {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    if file_name.is_none_or(|name| name.ends_with('~')) {
        return Ok(None);
    }

    let relative = path
        .strip_prefix(src_dir)
        .map_err(|_| DiscoveryError::OutsideSrcDir(path.to_path_buf()))?;
    let mut components = relative.components();
    let Some(main_type) = components.next() else {
        return Ok(None);
    };
    if components.next().is_none() {
        // A file directly under src/ has no main_type directory.
        debug!(path = %path.display(), "skipping file outside a main_type directory");
        return Ok(None);
    }
    let main_type = main_type.as_os_str().to_string_lossy().into_owned();

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let kind = if main_type == FILES_MAIN_TYPE {
        DatasourceKind::File
    } else if extension == "yaml" || extension == "yml" {
        DatasourceKind::Config
    } else if !extension.is_empty() {
        DatasourceKind::File
    } else {
        debug!(path = %path.display(), "skipping file without extension");
        return Ok(None);
    };

    let datasource_id = DatasourceId::from_config_file_path(src_dir, path)?;
    Ok(Some(DatasourceDescriptor {
        datasource_id,
        path: path.to_path_buf(),
        main_type,
        kind,
    }))
}

/// Convert a discovered datasource into a prepared one, ready for plugin
/// routing. Config files are template-rendered before the YAML parse.
pub fn prepare_source(
    layout: &ProjectLayout,
    descriptor: &DatasourceDescriptor,
) -> Result<PreparedDatasource, DiscoveryError> {
    match descriptor.kind {
        DatasourceKind::File => {
            let extension = descriptor
                .path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            Ok(PreparedDatasource::File {
                datasource_id: descriptor.datasource_id.clone(),
                datasource_type: DatasourceType::new(format!(
                    "{}/{extension}",
                    descriptor.main_type
                )),
                path: descriptor.path.clone(),
            })
        }
        DatasourceKind::Config => {
            let config = parse_config_file(layout, &descriptor.path)?;

            let subtype = config
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| DiscoveryError::MissingType(descriptor.path.clone()))?;

            let datasource_name = descriptor
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            Ok(PreparedDatasource::Config {
                datasource_id: descriptor.datasource_id.clone(),
                datasource_type: DatasourceType::new(subtype),
                path: descriptor.path.clone(),
                config,
                datasource_name,
            })
        }
    }
}

fn parse_config_file(layout: &ProjectLayout, path: &Path) -> Result<Value, DiscoveryError> {
    let raw = fs::read_to_string(path).map_err(|source| DiscoveryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let rendered = render_template(&layout.project_dir, &layout.src_dir(), &raw)?;

    serde_yaml::from_str(&rendered).map_err(|e| DiscoveryError::InvalidYaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::init_project_dir;
    use std::fs;

    fn project_with_sources(sources: &[(&str, &str)]) -> (tempfile::TempDir, ProjectLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = init_project_dir(dir.path()).unwrap();
        for (relative, content) in sources {
            let path = layout.src_dir().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        (dir, layout)
    }

    #[test]
    fn discovery_classifies_and_sorts_entries() {
        let (_dir, layout) = project_with_sources(&[
            ("files/zeta.md", "# z"),
            ("files/Alpha.txt", "a"),
            ("databases/warehouse.yaml", "type: duckdb\n"),
            ("databases/readme.txt", "not a config"),
            ("databases/backup.yaml~", "ignored"),
            ("databases/noextension", "ignored"),
        ]);

        let descriptors = discover_datasources(&layout).unwrap();
        let ids = descriptors
            .iter()
            .map(|d| d.datasource_id.as_str().to_string())
            .collect::<Vec<String>>();
        assert_eq!(
            ids,
            vec![
                "databases/readme.txt",
                "databases/warehouse.yaml",
                "files/Alpha.txt",
                "files/zeta.md",
            ]
        );

        let kinds = descriptors.iter().map(|d| d.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                DatasourceKind::File,
                DatasourceKind::Config,
                DatasourceKind::File,
                DatasourceKind::File,
            ]
        );
    }

    #[test]
    fn prepare_file_builds_full_type_from_extension() {
        let (_dir, layout) = project_with_sources(&[("files/note.md", "# hi")]);
        let descriptors = discover_datasources(&layout).unwrap();

        let prepared = prepare_source(&layout, &descriptors[0]).unwrap();
        assert_eq!(prepared.datasource_type().full_type, "files/md");
        assert_eq!(prepared.datasource_id().as_str(), "files/note.md");
    }

    #[test]
    fn prepare_config_reads_type_key_after_template_render() {
        let (_dir, layout) = project_with_sources(&[(
            "databases/warehouse.yaml",
            "type: duckdb\nname: warehouse\nconnection:\n  database: \"{{ PROJECT_DIR }}/wh.duckdb\"\n",
        )]);
        let descriptors = discover_datasources(&layout).unwrap();

        let prepared = prepare_source(&layout, &descriptors[0]).unwrap();
        assert_eq!(prepared.datasource_type().full_type, "duckdb");
        assert_eq!(prepared.datasource_name(), "warehouse");

        let PreparedDatasource::Config { config, .. } = prepared else {
            panic!("expected a config datasource");
        };
        let database = config["connection"]["database"].as_str().unwrap();
        assert!(database.ends_with("/wh.duckdb"));
        assert!(!database.contains("{{"));
    }

    #[test]
    fn prepare_config_without_type_fails() {
        let (_dir, layout) =
            project_with_sources(&[("databases/broken.yaml", "name: no-type\n")]);
        let descriptors = discover_datasources(&layout).unwrap();

        let err = prepare_source(&layout, &descriptors[0]).unwrap_err();
        assert!(matches!(err, DiscoveryError::MissingType(_)));
    }

    #[test]
    fn descriptors_for_explicit_ids_fail_on_unknown() {
        let (_dir, layout) = project_with_sources(&[("files/note.md", "# hi")]);

        let known = DatasourceId::from_string_repr("files/note.md");
        let found = get_datasource_descriptors(&layout, &[known]).unwrap();
        assert_eq!(found.len(), 1);

        let unknown = DatasourceId::from_string_repr("files/missing.md");
        let err = get_datasource_descriptors(&layout, &[unknown]).unwrap_err();
        assert!(matches!(err, DiscoveryError::ConfigFileNotFound(_)));
    }

    #[test]
    fn context_file_path_swaps_extension_for_yaml() {
        let id = DatasourceId::from_string_repr("files/note.md");
        assert_eq!(
            id.relative_path_to_context_file(),
            std::path::PathBuf::from("files/note.yaml")
        );
    }
}
