//! # Type Graph
//!
//! Links a raw, unordered [`FileDescriptorSet`] (as collected by the reflection
//! client) into a queryable [`DescriptorPool`].
//!
//! Linking is an explicit, memoized, dependencies-first pass: every file's
//! declared imports must resolve to another file in the same set, and each file
//! is visited exactly once no matter how many files import it. A missing
//! dependency is fatal. Proto imports form a DAG by construction, but a
//! misbehaving server could ship a cycle, so the pass guards against that
//! instead of recursing forever.
//!
//! Linking happens from the catalog's raw protos; the catalog memoizes linked
//! graphs under its reload generation, so linked descriptors never leak across
//! catalog generations. The underlying pool doubles as the type registry the
//! message codec resolves nested and foreign references against.
use prost_reflect::{
    DescriptorPool, FileDescriptor, MessageDescriptor, ServiceDescriptor,
};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("File '{file}' imports '{dependency}', which is not part of the descriptor set")]
    MissingDependency { file: String, dependency: String },

    #[error("File '{0}' participates in an import cycle")]
    DependencyCycle(String),

    #[error("Failed to build descriptor pool: '{0}'")]
    InvalidDescriptors(#[from] prost_reflect::DescriptorError),
}

/// An immutable, fully-linked set of file-level type definitions for one
/// server snapshot.
#[derive(Debug, Clone)]
pub struct TypeGraph {
    pool: DescriptorPool,
}

impl TypeGraph {
    /// Links `set` into a type graph.
    pub fn link(set: &FileDescriptorSet) -> Result<Self, LinkError> {
        let ordered = order_dependencies_first(set)?;
        let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: ordered })?;
        Ok(Self { pool })
    }

    /// The descriptor pool backing this graph, usable as a codec type registry.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    pub fn files(&self) -> impl Iterator<Item = FileDescriptor> + '_ {
        self.pool.files()
    }

    pub fn services(&self) -> impl Iterator<Item = ServiceDescriptor> + '_ {
        self.pool.services()
    }

    /// Every message type known to the graph, including nested ones.
    pub fn message_types(&self) -> impl Iterator<Item = MessageDescriptor> + '_ {
        self.pool.all_messages()
    }
}

/// Orders the files of `set` so that every file appears after all of its
/// declared dependencies, deduplicated by file name.
fn order_dependencies_first(
    set: &FileDescriptorSet,
) -> Result<Vec<FileDescriptorProto>, LinkError> {
    let index: HashMap<&str, &FileDescriptorProto> = set
        .file
        .iter()
        .filter_map(|fd| fd.name.as_deref().map(|name| (name, fd)))
        .collect();

    let mut linker = Linker {
        index,
        states: HashMap::new(),
        ordered: Vec::with_capacity(set.file.len()),
    };
    for fd in &set.file {
        if let Some(name) = fd.name.as_deref() {
            linker.visit(name)?;
        }
    }
    Ok(linker.ordered)
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    InProgress,
    Done,
}

struct Linker<'a> {
    index: HashMap<&'a str, &'a FileDescriptorProto>,
    states: HashMap<&'a str, VisitState>,
    ordered: Vec<FileDescriptorProto>,
}

impl<'a> Linker<'a> {
    fn visit(&mut self, name: &'a str) -> Result<(), LinkError> {
        match self.states.get(name) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                return Err(LinkError::DependencyCycle(name.to_string()));
            }
            None => {}
        }

        // The file itself is guaranteed to be in the index; only its imports
        // can be missing.
        let Some(&fd) = self.index.get(name) else {
            return Ok(());
        };
        self.states.insert(name, VisitState::InProgress);

        for dependency in &fd.dependency {
            if !self.index.contains_key(dependency.as_str()) {
                return Err(LinkError::MissingDependency {
                    file: name.to_string(),
                    dependency: dependency.clone(),
                });
            }
            self.visit(dependency)?;
        }

        self.states.insert(name, VisitState::Done);
        self.ordered.push(fd.clone());
        Ok(())
    }
}
