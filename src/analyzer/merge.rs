//! Comment-preserving structural merge.
//!
//! Reconciles a remediated document (serialized from typed objects, so it has
//! no comments and canonical key order) back into the document as authored.
//! The result carries the remediated values with the original comments, key
//! order and layout. List elements are paired up by a per-field identifying
//! key rather than by position.

use thiserror::Error;

use crate::analyzer::document::{
    self, Document, DocumentError, Element, Entry, Item, Layout, Mapping, Node, Pair, Sequence,
};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("cannot parse original document: {0}")]
    Original(#[source] DocumentError),

    #[error("cannot parse remediated document: {0}")]
    Fixed(#[source] DocumentError),

    #[error("document has no content to merge")]
    Empty,
}

/// Identifying keys for list-typed fields, tried in order. Lists not named
/// here match elements by full structural equality.
const IDENTITY_KEYS: &[(&str, &[&str])] = &[
    ("containers", &["name"]),
    ("initContainers", &["name"]),
    ("ephemeralContainers", &["name"]),
    ("env", &["name"]),
    ("volumeMounts", &["mountPath"]),
    ("volumeDevices", &["devicePath"]),
    ("ports", &["containerPort", "port"]),
    ("ownerReferences", &["uid", "name"]),
    ("volumes", &["name"]),
    ("imagePullSecrets", &["name"]),
    ("hostAliases", &["ip"]),
    ("sysctls", &["name"]),
    ("topologySpreadConstraints", &["topologyKey"]),
    ("readinessGates", &["conditionType"]),
    ("resourceClaims", &["name"]),
    ("conditions", &["type"]),
];

fn identity_keys(field: Option<&str>) -> &'static [&'static str] {
    field
        .and_then(|f| IDENTITY_KEYS.iter().find(|(name, _)| *name == f))
        .map(|(_, keys)| *keys)
        .unwrap_or(&[])
}

/// Merge two YAML documents given as text and render the result.
pub fn merge_yaml(original: &str, fixed: &str) -> Result<String, MergeError> {
    let original = document::parse(original).map_err(MergeError::Original)?;
    let fixed = document::parse(fixed).map_err(MergeError::Fixed)?;
    Ok(merge(&original, &fixed)?.render())
}

pub fn merge(original: &Document, fixed: &Document) -> Result<Document, MergeError> {
    let (Some(original_root), Some(fixed_root)) = (&original.root, &fixed.root) else {
        return Err(MergeError::Empty);
    };
    Ok(Document {
        root: Some(merge_node(original_root, fixed_root, None)),
        trailing: original.trailing.clone(),
        style: original.style,
    })
}

fn merge_node(original: &Node, fixed: &Node, field: Option<&str>) -> Node {
    if original.semantic_eq(fixed) {
        return original.clone();
    }
    match (original, fixed) {
        (Node::Mapping(o), Node::Mapping(f)) => merge_mapping(o, f),
        (Node::Sequence(o), Node::Sequence(f)) => merge_sequence(o, f, field),
        _ => fixed.adopted(),
    }
}

fn changed_layout(layout: &Layout) -> Layout {
    match layout {
        Layout::Flow { .. } => Layout::Flow { raw: None },
        block => block.clone(),
    }
}

fn merge_mapping(original: &Mapping, fixed: &Mapping) -> Node {
    if original.pair_count() == 0 {
        return Node::Mapping(fixed.clone()).adopted();
    }

    let mut entries = Vec::with_capacity(original.entries.len());
    for entry in &original.entries {
        match entry {
            Entry::Comment(_) => entries.push(entry.clone()),
            Entry::Pair(pair) => {
                if let Some(value) = fixed.get(&pair.key.name) {
                    entries.push(Entry::Pair(Pair {
                        value: merge_node(&pair.value, value, Some(&pair.key.name)),
                        ..pair.clone()
                    }));
                }
            }
        }
    }
    for pair in fixed.pairs() {
        if !original.contains_key(&pair.key.name) {
            entries.push(Entry::Pair(Pair {
                key: pair.key.clone(),
                value: pair.value.adopted(),
                sep: " ".to_string(),
                comment: None,
            }));
        }
    }

    Node::Mapping(Mapping {
        entries,
        layout: changed_layout(&original.layout),
    })
}

/// Whether `a` and `b` are the same list element.
fn same_element(a: &Node, b: &Node, keys: &[&str]) -> bool {
    if let (Node::Mapping(x), Node::Mapping(y)) = (a, b) {
        for key in keys {
            if let (Some(xv), Some(yv)) = (x.get(key), y.get(key)) {
                return xv.semantic_eq(yv);
            }
        }
    }
    a.semantic_eq(b)
}

fn merge_sequence(original: &Sequence, fixed: &Sequence, field: Option<&str>) -> Node {
    if original.element_count() == 0 {
        return Node::Sequence(fixed.clone()).adopted();
    }

    let keys = identity_keys(field);
    let candidates: Vec<&Node> = fixed.elements().map(|e| &e.value).collect();
    let mut used = vec![false; candidates.len()];
    let mut items = Vec::with_capacity(original.items.len() + candidates.len());

    for item in &original.items {
        match item {
            Item::Comment(_) => items.push(item.clone()),
            Item::Value(element) => {
                let found = candidates
                    .iter()
                    .enumerate()
                    .find(|(i, c)| !used[*i] && same_element(&element.value, c, keys))
                    .map(|(i, _)| i);
                if let Some(i) = found {
                    used[i] = true;
                    items.push(Item::Value(Element {
                        value: merge_node(&element.value, candidates[i], None),
                        ..element.clone()
                    }));
                }
            }
        }
    }
    for (i, candidate) in candidates.iter().enumerate() {
        if !used[i] {
            items.push(Item::Value(Element {
                value: candidate.adopted(),
                gap: 1,
                inline: true,
                comment: None,
            }));
        }
    }

    Node::Sequence(Sequence {
        items,
        layout: changed_layout(&original.layout),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserialize(text: &str) -> String {
        let value: serde_yaml::Value = serde_yaml::from_str(text).unwrap();
        serde_yaml::to_string(&value).unwrap()
    }

    const POD: &str = r#"# Pod used by the web tier
apiVersion: v1
kind: Pod
metadata:
  name: web # primary
  labels:
    app: web
spec:
  # keep the token off
  automountServiceAccountToken: false
  containers:
    - name: app
      image: nginx:1.25
      ports:
        - containerPort: 80
      securityContext:
        capabilities:
          drop: [NET_RAW]
# end of pod
"#;

    #[test]
    fn test_merge_with_own_serialization_is_identity() {
        let merged = merge_yaml(POD, &reserialize(POD)).unwrap();
        assert_eq!(merged, POD);
    }

    #[test]
    fn test_untouched_comments_survive_a_change() {
        let fixed = reserialize(POD).replace("app: web", "app: api");
        let merged = merge_yaml(POD, &fixed).unwrap();
        assert_eq!(merged, POD.replace("app: web", "app: api"));
        assert!(merged.contains("  # keep the token off\n"));
        assert!(merged.ends_with("# end of pod\n"));
    }

    #[test]
    fn test_containers_match_by_name() {
        let original = "\
spec:
  containers:
  # first
  - name: a
    image: x   # pinned
  - name: b
    image: y
";
        let fixed = "\
spec:
  containers:
  - image: x
    name: a
    securityContext:
      readOnlyRootFilesystem: true
  - image: y
    name: b
  - image: z
    name: c
";
        let expected = "\
spec:
  containers:
  # first
  - name: a
    image: x   # pinned
    securityContext:
      readOnlyRootFilesystem: true
  - name: b
    image: y
  - image: z
    name: c
";
        assert_eq!(merge_yaml(original, fixed).unwrap(), expected);
    }

    #[test]
    fn test_reordered_fixed_list_keeps_original_order() {
        let original = "env:\n- name: A\n  value: '1'\n- name: B\n  value: '2'\n";
        let fixed = "env:\n- name: B\n  value: '3'\n- name: A\n  value: '1'\n";
        assert_eq!(
            merge_yaml(original, fixed).unwrap(),
            "env:\n- name: A\n  value: '1'\n- name: B\n  value: '3'\n"
        );
    }

    #[test]
    fn test_dropped_key_takes_its_comment() {
        let original = "a: 1 # one\n# about b\nb: 2 # two\n";
        let fixed = "b: 2\n";
        assert_eq!(merge_yaml(original, fixed).unwrap(), "# about b\nb: 2 # two\n");
    }

    #[test]
    fn test_flow_scalar_list_gains_elements() {
        let original = "drop: [NET_RAW] # minimal\n";
        let fixed = "drop:\n- NET_RAW\n- CHOWN\n";
        assert_eq!(
            merge_yaml(original, fixed).unwrap(),
            "drop: [NET_RAW, CHOWN] # minimal\n"
        );
    }

    #[test]
    fn test_empty_flow_mapping_becomes_block() {
        let original = "securityContext: {}\n";
        let fixed = "securityContext:\n  privileged: false\n";
        assert_eq!(
            merge_yaml(original, fixed).unwrap(),
            "securityContext:\n  privileged: false\n"
        );
    }

    #[test]
    fn test_owner_references_match_by_uid_then_name() {
        let original = "ownerReferences:\n- name: rs # owner\n  uid: '1'\n";
        let fixed = "ownerReferences:\n- name: rs-renamed\n  uid: '1'\n";
        assert_eq!(
            merge_yaml(original, fixed).unwrap(),
            "ownerReferences:\n- name: rs-renamed # owner\n  uid: '1'\n"
        );
    }

    #[test]
    fn test_unknown_list_falls_back_to_equality() {
        let original = "tolerations:\n- key: a # keep\n- key: b\n  effect: NoSchedule\n";
        let fixed = "tolerations:\n- key: a\n- key: b\n  effect: NoExecute\n";
        assert_eq!(
            merge_yaml(original, fixed).unwrap(),
            "tolerations:\n- key: a # keep\n- key: b\n  effect: NoExecute\n"
        );
    }

    #[test]
    fn test_scalar_change_keeps_key_comment() {
        let original = "privileged: true  # needed?\n";
        let fixed = "privileged: false\n";
        assert_eq!(merge_yaml(original, fixed).unwrap(), "privileged: false  # needed?\n");
    }

    #[test]
    fn test_empty_original_is_an_error() {
        assert!(matches!(merge_yaml("# only a comment\n", "a: 1\n"), Err(MergeError::Empty)));
        assert!(matches!(merge_yaml("a:\n\tb\n", "a: 1\n"), Err(MergeError::Original(_))));
    }
}
