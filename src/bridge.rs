//! Symbol resolution bridge
//!
//! Source-level resolvers see the workspace through [`TypeSolver`]. The
//! bridge holds no state of its own: every lookup goes to the live layers,
//! so a resolution that runs after an edit sees the edit.

use crate::unit::to_internal_name;
use crate::workspace::Workspace;
use crate::Result;
use serde::Serialize;

/// A field or method as seen by a source resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
}

/// Declared shape of one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeMembers {
    /// Internal name of the resolved unit
    pub name: String,
    pub is_interface: bool,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
}

impl TypeMembers {
    pub fn method(&self, name: &str) -> impl Iterator<Item = &MemberInfo> {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&MemberInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Name lookups offered to a source parser.
pub trait TypeSolver {
    fn has_type(&self, name: &str) -> bool;

    /// Declared members of a type; `Ok(None)` when no layer has it
    fn members(&self, name: &str) -> Result<Option<TypeMembers>>;
}

/// Result of parsing one source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    Failed(Vec<String>),
}

impl<T> ParseOutcome<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed(_))
    }

    pub fn tree(&self) -> Option<&T> {
        match self {
            ParseOutcome::Parsed(tree) => Some(tree),
            ParseOutcome::Failed(_) => None,
        }
    }

    pub fn problems(&self) -> &[String] {
        match self {
            ParseOutcome::Parsed(_) => &[],
            ParseOutcome::Failed(problems) => problems,
        }
    }
}

/// A source-level parser/resolver.
///
/// Implementations report failures through [`ParseOutcome::Failed`] and
/// never panic past this call.
pub trait SourceParser {
    type Tree;

    fn parse(&self, name: &str, text: &str, solver: &dyn TypeSolver) -> ParseOutcome<Self::Tree>;
}

/// [`TypeSolver`] over a workspace's full resolution order
pub struct WorkspaceTypeSolver<'a> {
    workspace: &'a Workspace,
}

impl<'a> WorkspaceTypeSolver<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    /// Map a source or internal name to the unit it denotes.
    ///
    /// `a.b.Outer.Inner` is tried as `a/b/Outer/Inner`, then
    /// `a/b/Outer$Inner`, then `a/b$Outer$Inner`.
    pub fn resolve_name(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        let mut candidate = to_internal_name(name);
        loop {
            if self.workspace.has_unit(&candidate) {
                return Some(candidate);
            }
            let split = candidate.rfind('/')?;
            candidate.replace_range(split..=split, "$");
        }
    }
}

impl TypeSolver for WorkspaceTypeSolver<'_> {
    fn has_type(&self, name: &str) -> bool {
        self.resolve_name(name).is_some()
    }

    fn members(&self, name: &str) -> Result<Option<TypeMembers>> {
        let Some(internal) = self.resolve_name(name) else {
            return Ok(None);
        };
        let Some(decl) = self.workspace.decode_unit(&internal)? else {
            return Ok(None);
        };

        let member = |name: &str, descriptor: &str, access: u16| MemberInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
        };
        Ok(Some(TypeMembers {
            name: internal,
            is_interface: decl.is_interface(),
            fields: decl.fields.iter().map(|f| member(&f.name, &f.descriptor, f.access)).collect(),
            methods: decl.methods.iter().map(|m| member(&m.name, &m.descriptor, m.access)).collect(),
            super_name: decl.super_name,
            interfaces: decl.interfaces,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{access, ClassBuilder, OBJECT};
    use crate::testing::{class_bytes, workspace};
    use crate::Error;
    use std::collections::HashSet;

    fn outer_and_inner() -> Vec<Vec<u8>> {
        vec![
            ClassBuilder::new("com/example/Outer")
                .field(access::PRIVATE, "count", "I")
                .abstract_method("size", "()I")
                .to_bytes()
                .unwrap(),
            class_bytes("com/example/Outer$Inner", Some(OBJECT), &[]),
        ]
    }

    #[test]
    fn test_source_names_resolve_nested_classes() {
        let ws = workspace(outer_and_inner());
        let solver = WorkspaceTypeSolver::new(&ws);

        assert_eq!(solver.resolve_name("com.example.Outer").as_deref(), Some("com/example/Outer"));
        assert_eq!(solver.resolve_name("com.example.Outer.Inner").as_deref(), Some("com/example/Outer$Inner"));
        assert_eq!(solver.resolve_name("com/example/Outer$Inner").as_deref(), Some("com/example/Outer$Inner"));
        assert!(solver.has_type("java.lang.Object"));
        assert!(!solver.has_type("com.example.Missing"));
        assert!(!solver.has_type(""));
    }

    #[test]
    fn test_members_list_declarations() {
        let ws = workspace(outer_and_inner());
        let solver = WorkspaceTypeSolver::new(&ws);

        let members = solver.members("com.example.Outer").unwrap().unwrap();
        assert_eq!(members.super_name.as_deref(), Some(OBJECT));
        assert_eq!(members.field("count").unwrap().descriptor, "I");
        assert_eq!(members.method("size").count(), 1);
        assert!(solver.members("com.example.Nope").unwrap().is_none());
    }

    #[test]
    fn test_edits_are_visible_without_refresh() {
        let mut ws = workspace(vec![class_bytes("com/example/A", Some(OBJECT), &[])]);
        assert!(!WorkspaceTypeSolver::new(&ws).has_type("com.example.B"));

        ws.primary_mut().put_unit("com/example/B", class_bytes("com/example/B", Some(OBJECT), &[]));
        ws.on_primary_definition_changes(HashSet::from(["com/example/B".to_string()]));
        assert!(WorkspaceTypeSolver::new(&ws).has_type("com.example.B"));
    }

    #[test]
    fn test_malformed_unit_is_an_error() {
        let mut ws = workspace(vec![]);
        ws.primary_mut().put_unit("com/example/Bad", vec![0xca, 0xfe]);
        let solver = WorkspaceTypeSolver::new(&ws);
        assert!(solver.has_type("com.example.Bad"));
        assert!(matches!(solver.members("com.example.Bad"), Err(Error::Decode { .. })));
    }

    struct WordCounter;

    impl SourceParser for WordCounter {
        type Tree = Vec<String>;

        fn parse(&self, _name: &str, text: &str, solver: &dyn TypeSolver) -> ParseOutcome<Vec<String>> {
            let unknown: Vec<String> = text
                .split_whitespace()
                .filter(|word| !solver.has_type(word))
                .map(|word| format!("cannot resolve {}", word))
                .collect();
            if unknown.is_empty() {
                ParseOutcome::Parsed(text.split_whitespace().map(str::to_string).collect())
            } else {
                ParseOutcome::Failed(unknown)
            }
        }
    }

    #[test]
    fn test_analyze_sources_reports_per_source() {
        let mut ws = workspace(outer_and_inner());
        ws.primary_mut().attach_source("com/example/Outer", "java.lang.Object com.example.Outer.Inner");
        ws.primary_mut().attach_source("com/example/Broken", "com.example.Ghost");

        let results = ws.analyze_sources(&WordCounter);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "com/example/Broken");
        assert_eq!(results[0].1.problems(), &["cannot resolve com.example.Ghost".to_string()]);
        assert!(results[1].1.is_parsed());
        assert_eq!(results[1].1.tree().unwrap().len(), 2);
    }
}
