//! Module graph resolution.
//!
//! Phase 1 mounts every reachable module exactly once, hoisting global modules
//! out of the child lists. Phase 2 computes each node's visible-provider list
//! once the whole tree is known.

use std::collections::{HashMap, HashSet};

use crate::contracts::ProviderDescriptor;
use crate::error::BootstrapError;
use crate::registry::{ModuleDescriptor, ProviderRegistry};
use crate::type_ref::TypeRef;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub descriptor: ModuleDescriptor,
    /// Non-global imports mounted under this node.
    pub children: Vec<NodeId>,
    visible: Vec<ProviderDescriptor>,
}

impl ModuleNode {
    fn new(descriptor: ModuleDescriptor) -> Self {
        Self {
            descriptor,
            children: Vec::new(),
            visible: Vec::new(),
        }
    }

    /// Providers this module may inject into its providers and controllers.
    pub fn visible(&self) -> &[ProviderDescriptor] {
        &self.visible
    }

    pub fn type_ref(&self) -> TypeRef {
        self.descriptor.type_ref
    }

    fn extend_visible<'a>(&mut self, items: impl IntoIterator<Item = &'a ProviderDescriptor>) {
        for p in items {
            push_provider(&mut self.visible, *p);
        }
    }
}

fn push_provider(list: &mut Vec<ProviderDescriptor>, p: ProviderDescriptor) {
    if !list.iter().any(|q| q.type_ref == p.type_ref) {
        list.push(p);
    }
}

/// Arena of mounted modules: root subtree plus the global set.
#[derive(Debug, Clone)]
pub struct ModuleTree {
    nodes: Vec<ModuleNode>,
    root: NodeId,
    globals: Vec<NodeId>,
    index: HashMap<TypeRef, NodeId>,
}

impl ModuleTree {
    pub fn root(&self) -> &ModuleNode {
        &self.nodes[self.root]
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &ModuleNode {
        &self.nodes[id]
    }

    pub fn find(&self, ty: TypeRef) -> Option<&ModuleNode> {
        self.index.get(&ty).map(|&id| &self.nodes[id])
    }

    /// Global modules in the order they were classified.
    pub fn globals(&self) -> &[NodeId] {
        &self.globals
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root subtree in pre-order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        out
    }

    /// Global subtrees first, then the root subtree; children before parents.
    pub fn instantiation_order(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.nodes.len());
        for &g in &self.globals {
            self.postorder(g, &mut seen, &mut out);
        }
        self.postorder(self.root, &mut seen, &mut out);
        out
    }

    fn postorder(&self, id: NodeId, seen: &mut HashSet<NodeId>, out: &mut Vec<NodeId>) {
        if !seen.insert(id) {
            return;
        }
        for &child in &self.nodes[id].children {
            self.postorder(child, seen, out);
        }
        out.push(id);
    }
}

/// Builds a [`ModuleTree`] from a root module.
pub struct ModuleGraphResolver<'a> {
    registry: &'a ProviderRegistry,
    nodes: Vec<ModuleNode>,
    index: HashMap<TypeRef, NodeId>,
    globals: Vec<NodeId>,
    mounted: HashSet<TypeRef>,
}

impl<'a> ModuleGraphResolver<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self {
            registry,
            nodes: Vec::new(),
            index: HashMap::new(),
            globals: Vec::new(),
            mounted: HashSet::new(),
        }
    }

    pub fn resolve(mut self, root: TypeRef) -> Result<ModuleTree, BootstrapError> {
        let root = self.mount(root)?;
        tracing::debug!(
            modules = self.nodes.len(),
            globals = self.globals.len(),
            "Module tree built"
        );
        let mut tree = ModuleTree {
            nodes: self.nodes,
            root,
            globals: self.globals,
            index: self.index,
        };
        propagate(&mut tree)?;
        Ok(tree)
    }

    fn mount(&mut self, ty: TypeRef) -> Result<NodeId, BootstrapError> {
        let descriptor = self.registry.module_descriptor(ty)?;
        // Marked before recursing so that mutual imports terminate.
        self.mounted.insert(ty);

        let mut imports = descriptor.imports.clone();
        imports.sort_by_key(|t| !self.registry.is_global(*t));

        let id = self.nodes.len();
        self.nodes.push(ModuleNode::new(descriptor));
        self.index.insert(ty, id);

        for import in imports {
            if self.mounted.contains(&import) {
                tracing::trace!(module = %ty, import = %import, "Import already mounted");
                continue;
            }
            let child = self.mount(import)?;
            if self.nodes[child].descriptor.is_global {
                tracing::debug!(module = %import, "Module classified global");
                self.globals.push(child);
            } else {
                self.nodes[id].children.push(child);
            }
        }
        Ok(id)
    }
}

/// Phase 2: fill every node's visible list.
fn propagate(tree: &mut ModuleTree) -> Result<(), BootstrapError> {
    let mut memo = HashMap::new();
    let mut stack = HashSet::new();

    // Validates the exports of every mounted module, imported or not.
    for id in 0..tree.nodes.len() {
        exports_of(tree, id, &mut memo, &mut stack)?;
    }

    let mut global_exports = Vec::new();
    for &g in &tree.globals {
        for p in &memo[&g] {
            push_provider(&mut global_exports, *p);
        }
    }
    let root_providers = tree.nodes[tree.root].descriptor.providers.clone();

    let mut order: Vec<NodeId> = Vec::with_capacity(tree.nodes.len());
    for &g in &tree.globals {
        order.push(g);
    }
    order.extend(tree.preorder());
    for id in 0..tree.nodes.len() {
        if !order.contains(&id) {
            order.push(id);
        }
    }

    for id in order {
        let mut from_imports = Vec::new();
        for import in &tree.nodes[id].descriptor.imports {
            if let Some(import_id) = tree.index.get(import) {
                for p in &memo[import_id] {
                    push_provider(&mut from_imports, *p);
                }
            }
        }
        let node = &mut tree.nodes[id];
        let own = node.descriptor.providers.clone();
        node.extend_visible(&own);
        node.extend_visible(&from_imports);
        node.extend_visible(&global_exports);
        node.extend_visible(&root_providers);
        tracing::trace!(module = %node.type_ref(), visible = node.visible.len(), "Providers propagated");
    }
    Ok(())
}

/// Providers exported by a module, following re-exported modules transitively.
fn exports_of(
    tree: &ModuleTree,
    id: NodeId,
    memo: &mut HashMap<NodeId, Vec<ProviderDescriptor>>,
    stack: &mut HashSet<NodeId>,
) -> Result<Vec<ProviderDescriptor>, BootstrapError> {
    if let Some(done) = memo.get(&id) {
        return Ok(done.clone());
    }
    if !stack.insert(id) {
        return Ok(Vec::new());
    }

    let d = &tree.nodes[id].descriptor;
    let mut out = Vec::new();
    for export in &d.exports {
        if let Some(p) = d.provider(*export) {
            push_provider(&mut out, *p);
            continue;
        }
        if d.imports.contains(export) {
            if let Some(&module) = tree.index.get(export) {
                for p in exports_of(tree, module, memo, stack)? {
                    push_provider(&mut out, p);
                }
            }
            continue;
        }

        let mut found = None;
        for import in &d.imports {
            let Some(&module) = tree.index.get(import) else {
                continue;
            };
            found = exports_of(tree, module, memo, stack)?
                .into_iter()
                .find(|p| p.type_ref == *export);
            if found.is_some() {
                break;
            }
        }
        match found {
            Some(p) => push_provider(&mut out, p),
            None => {
                return Err(BootstrapError::UnknownExport {
                    module: d.name(),
                    export: export.short_name(),
                })
            }
        }
    }

    stack.remove(&id);
    memo.insert(id, out.clone());
    Ok(out)
}
