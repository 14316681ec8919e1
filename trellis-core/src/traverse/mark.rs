//! Invalidate and delete traversals.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::graph::{EntityKey, Graph, Identity, ROOT_FIELD};
use crate::options::TargetOptions;
use crate::schema::Schema;
use crate::selector::SelectionSet;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Invalidate,
    Delete,
}

/// Resolve the root of a mutation.
///
/// Anonymous types have no root (`Ok(None)`); a named type without an id is
/// misuse.
pub(crate) fn target(schema: &Schema, options: &TargetOptions) -> Result<Option<EntityKey>> {
    let ty = schema.require(&options.ty)?;
    let Some(name) = ty.name() else {
        return Ok(None);
    };
    options
        .id
        .as_ref()
        .and_then(|id| EntityKey::identify(schema, &options.ty, Identity::Id(id)))
        .map(Some)
        .ok_or_else(|| Error::MissingId {
            type_name: name.to_string(),
        })
}

pub(crate) struct Marker<'g> {
    graph: &'g mut Graph,
    mode: Mode,
    /// (entity, selection set address) pairs already walked.
    seen: HashSet<(EntityKey, usize)>,
}

impl<'g> Marker<'g> {
    pub fn new(graph: &'g mut Graph, mode: Mode) -> Self {
        Self {
            graph,
            mode,
            seen: HashSet::new(),
        }
    }

    pub fn run(mut self, key: &EntityKey, selection: Option<&SelectionSet>) {
        match selection {
            Some(set) => {
                let mut pending = vec![(key.clone(), set)];
                while let Some((key, set)) = pending.pop() {
                    self.entity(&key, set, &mut pending);
                }
            }
            None => self.whole(key),
        }
    }

    fn whole(&mut self, key: &EntityKey) {
        match self.mode {
            Mode::Delete => {
                self.graph.remove(key);
            }
            Mode::Invalidate => {
                if let Some(entity) = self.graph.get_mut(key) {
                    for field in entity.field_names() {
                        entity.invalidate_field(&field);
                    }
                }
            }
        }
    }

    fn entity<'s>(
        &mut self,
        key: &EntityKey,
        set: &'s SelectionSet,
        pending: &mut Vec<(EntityKey, &'s SelectionSet)>,
    ) {
        if !self.seen.insert((key.clone(), set as *const SelectionSet as usize)) {
            return;
        }
        let mode = self.mode;
        let Some(entity) = self.graph.get_mut(key) else {
            return;
        };

        let Some(map) = entity.value.as_object() else {
            if mode == Mode::Invalidate {
                entity.invalidate_field(ROOT_FIELD);
            }
            apply(&mut entity.value, set, mode, pending);
            return;
        };

        let picked: Vec<(String, Option<&'s SelectionSet>)> = set
            .expand(map.keys().map(String::as_str))
            .into_iter()
            .filter(|pick| map.contains_key(pick.name))
            .map(|pick| (pick.name.to_string(), pick.selection_set))
            .collect();

        for (field, nested) in picked {
            match (mode, nested) {
                (Mode::Invalidate, nested) => {
                    entity.invalidate_field(&field);
                    if let (Some(nested), Some(value)) = (nested, entity.value.get(&field)) {
                        collect(value, nested, pending);
                    }
                }
                (Mode::Delete, None) => {
                    entity.remove_field(&field);
                }
                (Mode::Delete, Some(nested)) => {
                    if let Some(value) = entity.value.as_object_mut().and_then(|map| map.get_mut(&field)) {
                        apply(value, nested, mode, pending);
                    }
                }
            }
        }
    }
}

/// Queue every reference reachable from `value` under `set` without
/// changing anything.
fn collect<'s>(value: &Value, set: &'s SelectionSet, pending: &mut Vec<(EntityKey, &'s SelectionSet)>) {
    match value {
        Value::Ref(reference) => pending.push((reference.key().clone(), set)),
        Value::Array(items) => items.iter().for_each(|item| collect(item, set, pending)),
        Value::Object(map) => {
            for pick in set.expand(map.keys().map(String::as_str)) {
                if let (Some(nested), Some(child)) = (pick.selection_set, map.get(pick.name)) {
                    collect(child, nested, pending);
                }
            }
        }
        _ => {}
    }
}

/// Apply a selection to a value nested inside an entity: references are
/// queued, and in delete mode the selected leaves of inline objects are
/// removed in place.
fn apply<'s>(
    value: &mut Value,
    set: &'s SelectionSet,
    mode: Mode,
    pending: &mut Vec<(EntityKey, &'s SelectionSet)>,
) {
    if mode == Mode::Invalidate {
        collect(value, set, pending);
        return;
    }
    match value {
        Value::Ref(reference) => pending.push((reference.key().clone(), set)),
        Value::Array(items) => items.iter_mut().for_each(|item| apply(item, set, mode, pending)),
        Value::Object(map) => {
            let picked: Vec<(String, Option<&'s SelectionSet>)> = set
                .expand(map.keys().map(String::as_str))
                .into_iter()
                .map(|pick| (pick.name.to_string(), pick.selection_set))
                .collect();
            for (field, nested) in picked {
                match nested {
                    None => {
                        map.shift_remove(&field);
                    }
                    Some(nested) => {
                        if let Some(child) = map.get_mut(&field) {
                            apply(child, nested, mode, pending);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Entity;
    use crate::selector::parse;
    use crate::value::{Map, Reference};
    use serde_json::json;

    fn key(type_name: &str, id: &str) -> EntityKey {
        EntityKey::new(type_name, id)
    }

    fn graph() -> Graph {
        let mut graph = Graph::new();
        let mut post = Map::new();
        post.insert("title".into(), Value::from("t"));
        post.insert("meta".into(), Value::from(json!({ "draft": true, "views": 3 })));
        post.insert(
            "comments".into(),
            Value::Array(vec![
                Value::Ref(Reference::new(key("Comment", "1"))),
                Value::Ref(Reference::new(key("Comment", "2"))),
            ]),
        );
        graph.set(Entity::with_value(key("Post", "1"), Value::Object(post)));
        for id in ["1", "2"] {
            graph.set(Entity::with_value(
                key("Comment", id),
                Value::from(json!({ "text": "hi", "author": "x" })),
            ));
        }
        graph
    }

    #[test]
    fn invalidate_without_selector_marks_every_field() {
        let mut graph = graph();
        Marker::new(&mut graph, Mode::Invalidate).run(&key("Post", "1"), None);

        let post = graph.get(&key("Post", "1")).unwrap();
        assert!(["title", "meta", "comments"].iter().all(|f| post.is_invalidated(f)));
        assert!(!graph.get(&key("Comment", "1")).unwrap().is_invalidated("text"));
    }

    #[test]
    fn invalidate_follows_nested_selections() {
        let mut graph = graph();
        let doc = parse("{ comments { text } }").unwrap();
        Marker::new(&mut graph, Mode::Invalidate).run(&key("Post", "1"), Some(&doc.selection_set));

        let post = graph.get(&key("Post", "1")).unwrap();
        assert!(post.is_invalidated("comments"));
        assert!(!post.is_invalidated("title"));
        for id in ["1", "2"] {
            let comment = graph.get(&key("Comment", id)).unwrap();
            assert!(comment.is_invalidated("text"));
            assert!(!comment.is_invalidated("author"));
        }
    }

    #[test]
    fn delete_without_selector_removes_entity() {
        let mut graph = graph();
        Marker::new(&mut graph, Mode::Delete).run(&key("Comment", "1"), None);
        assert!(!graph.contains(&key("Comment", "1")));
        assert!(graph.contains(&key("Post", "1")));
    }

    #[test]
    fn delete_removes_selected_leaves_only() {
        let mut graph = graph();
        let doc = parse("{ title meta { draft } comments { author } }").unwrap();
        Marker::new(&mut graph, Mode::Delete).run(&key("Post", "1"), Some(&doc.selection_set));

        let post = graph.get(&key("Post", "1")).unwrap();
        assert!(post.value.get("title").is_none());
        assert_eq!(post.value.get("meta"), Some(&Value::from(json!({ "views": 3 }))));
        assert!(post.value.get("comments").is_some());

        let comment = graph.get(&key("Comment", "2")).unwrap();
        assert_eq!(comment.value, Value::from(json!({ "text": "hi" })));
    }

    #[test]
    fn cyclic_selections_terminate() {
        let mut graph = Graph::new();
        let mut a = Map::new();
        a.insert("next".into(), Value::Ref(Reference::new(key("Node", "a"))));
        graph.set(Entity::with_value(key("Node", "a"), Value::Object(a)));

        let doc = parse("{ next { next { next } } }").unwrap();
        Marker::new(&mut graph, Mode::Invalidate).run(&key("Node", "a"), Some(&doc.selection_set));
        assert!(graph.get(&key("Node", "a")).unwrap().is_invalidated("next"));
    }
}
