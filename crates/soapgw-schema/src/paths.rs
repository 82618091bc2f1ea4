//! Known-path derivation
//!
//! The known paths of an operation are the dotted field names a template can
//! reach from the decoded root: `Country`, `Country.Name`, ... Lists are
//! traversed transparently and a record that re-enters its own ancestry is
//! not expanded again.

use crate::record::GeneratedRecord;
use crate::resolver::TypeGraph;
use std::collections::BTreeSet;

/// Every path reachable from the graph's data record
pub fn known_paths(graph: &TypeGraph) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    if let Some(root) = graph.data_record() {
        let mut ancestry = vec![root.name.clone()];
        walk(graph, root, "", &mut ancestry, &mut out);
    }
    out
}

fn walk(
    graph: &TypeGraph,
    record: &GeneratedRecord,
    prefix: &str,
    ancestry: &mut Vec<String>,
    out: &mut BTreeSet<String>,
) {
    for field in &record.fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };
        out.insert(path.clone());

        let Some(nested) = field.field_type.record_name() else {
            continue;
        };
        if ancestry.iter().any(|a| a == nested) {
            continue;
        }
        if let Some(child) = graph.record(nested) {
            ancestry.push(nested.to_string());
            walk(graph, child, &path, ancestry, out);
            ancestry.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldType, RecordField, RecordKind, ScalarType};
    use std::collections::BTreeMap;

    fn record(name: &str, fields: Vec<RecordField>) -> GeneratedRecord {
        GeneratedRecord {
            name: name.to_string(),
            kind: RecordKind::Complex,
            fields,
        }
    }

    fn graph(root: &str, records: Vec<GeneratedRecord>) -> TypeGraph {
        TypeGraph {
            root: root.to_string(),
            records: records
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_nested_and_list_paths() {
        let g = graph(
            "Response",
            vec![
                record("Response", vec![
                    RecordField::element("Country", FieldType::Record("Country".to_string())),
                    RecordField::element(
                        "Countries",
                        FieldType::list(FieldType::Record("Country".to_string())),
                    ),
                ]),
                record("Country", vec![
                    RecordField::element("Name", FieldType::Scalar(ScalarType::String)),
                    RecordField::element("Code", FieldType::Scalar(ScalarType::String)),
                ]),
            ],
        );
        let paths: Vec<String> = known_paths(&g).into_iter().collect();
        assert_eq!(
            paths,
            vec![
                "Countries",
                "Countries.Code",
                "Countries.Name",
                "Country",
                "Country.Code",
                "Country.Name",
            ]
        );
    }

    #[test]
    fn test_recursive_record_is_cut() {
        let g = graph(
            "Node",
            vec![record("Node", vec![
                RecordField::element("Label", FieldType::Scalar(ScalarType::String)),
                RecordField::element("Child", FieldType::Record("Node".to_string())),
            ])],
        );
        let paths: Vec<String> = known_paths(&g).into_iter().collect();
        assert_eq!(paths, vec!["Child", "Label"]);
    }

    #[test]
    fn test_empty_graph_has_no_paths() {
        let g = graph("Missing", vec![]);
        assert!(known_paths(&g).is_empty());
    }
}
