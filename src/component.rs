//! Component Runtime
//!
//! Binds a component's scope to its template: every effective scope write
//! recompiles the template, materializes a fresh fragment and replaces the
//! host's children with it. Registered components found in a rendered tree
//! are mounted as nested components.

use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::backend::{NodeRef, SharedBackend};
use crate::compiler::compile;
use crate::error::{QuakeError, Result};
use crate::materialize::materialize;
use crate::node::{RenderNode, RenderTree, Template};
use crate::options::QuakeOptions;
use crate::scope::{Scope, Subscriber};
use crate::validate::validate_template;
use crate::value::{Context, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// AUTHORING SURFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Behavior attached to a custom element. Every hook defaults to a no-op.
pub trait Component {
    /// Registers the component's scope and static template bindings.
    fn declare(&self, _declarations: &mut Declarations) {}

    /// Called once after inputs were delivered. May render through the scope.
    fn on_init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once, after the first view was rendered.
    fn on_view_init(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_input_change(&mut self, _name: &str, _value: &Value) -> Result<()> {
        Ok(())
    }

    fn on_destroy(&mut self) {}
}

/// What a component exposes to its template.
#[derive(Debug, Default)]
pub struct Declarations {
    scopes: Vec<Scope>,
    bindings: Context,
}

impl Declarations {
    pub fn scope(&mut self, scope: &Scope) -> &mut Self {
        self.scopes.push(scope.clone());
        self
    }

    /// A value visible to the template that never triggers renders.
    pub fn binding(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.bindings.insert(name.into(), value.into());
        self
    }
}

/// Single-subscriber event emitter.
pub struct Output<T> {
    subscription: RefCell<Option<Rc<dyn Fn(&T)>>>,
}

impl<T> Output<T> {
    pub fn new() -> Self {
        Self {
            subscription: RefCell::new(None),
        }
    }

    /// Installs `f`, replacing any previous subscriber.
    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(&T) + 'static,
    {
        *self.subscription.borrow_mut() = Some(Rc::new(f));
    }

    pub fn dispatch(&self, event: &T) {
        let subscription = self.subscription.borrow().clone();
        if let Some(f) = subscription {
            f(event);
        }
    }
}

impl<T> Default for Output<T> {
    fn default() -> Self {
        Self::new()
    }
}

type Factory = Rc<dyn Fn() -> Box<dyn Component>>;

/// Tag, template, declared inputs and constructor of a component.
#[derive(Clone)]
pub struct ComponentDefinition {
    tag: String,
    template: Rc<Template>,
    inputs: Vec<String>,
    factory: Factory,
}

impl ComponentDefinition {
    pub fn new<F, C>(tag: impl Into<String>, template: Template, factory: F) -> Self
    where
        F: Fn() -> C + 'static,
        C: Component + 'static,
    {
        Self {
            tag: tag.into(),
            template: Rc::new(template),
            inputs: Vec::new(),
            factory: Rc::new(move || Box::new(factory()) as Box<dyn Component>),
        }
    }

    /// Parses `source` as the template.
    pub fn from_source<F, C>(tag: impl Into<String>, source: &str, factory: F) -> Result<Self>
    where
        F: Fn() -> C + 'static,
        C: Component + 'static,
    {
        Ok(Self::new(tag, Template::parse(source)?, factory))
    }

    /// Attribute names a parent may pass down.
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("tag", &self.tag)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Component definitions keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    definitions: IndexMap<String, ComponentDefinition>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ComponentDefinition) -> Result<()> {
        if self.definitions.contains_key(definition.tag()) {
            return Err(QuakeError::DuplicateComponent {
                tag: definition.tag().to_string(),
            });
        }
        self.definitions
            .insert(definition.tag().to_string(), definition);
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<&ComponentDefinition> {
        self.definitions.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.definitions.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOUNTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a mounted component shares with its nested components.
#[derive(Clone)]
struct Environment {
    backend: SharedBackend,
    registry: Rc<Registry>,
    options: QuakeOptions,
}

struct Renderer {
    definition: ComponentDefinition,
    host: NodeRef,
    env: Environment,
    scope: Option<Scope>,
    subscription: RefCell<Option<Subscriber>>,
    bindings: Context,
    inputs: Context,
    instance: RefCell<Box<dyn Component>>,
    children: RefCell<Vec<MountedComponent>>,
    render_count: Cell<usize>,
    mounted: Cell<bool>,
}

impl Renderer {
    /// Template context: bindings, then inputs, then the scope state.
    fn context(&self) -> Context {
        let mut context = self.bindings.clone();
        context.extend(self.inputs.clone());
        if let Some(scope) = &self.scope {
            context.extend(scope.snapshot());
        }
        context
    }

    fn render(&self) -> Result<()> {
        let tag = self.definition.tag();
        // a failed compile returns before the host is touched
        let tree = compile(tag, self.definition.template(), self.context())?;

        let materialized = materialize(tree, &mut *self.env.backend.borrow_mut());

        // nested components mount into the detached fragment; the host only
        // changes once every one of them succeeded
        let nested = if self.env.options.mount_nested {
            match self.mount_nested(&materialized.tree) {
                Ok(nested) => nested,
                Err(e) => {
                    self.env.backend.borrow_mut().discard(materialized.fragment);
                    return Err(e);
                }
            }
        } else {
            Vec::new()
        };

        self.env
            .backend
            .borrow_mut()
            .replace_children(self.host, materialized.fragment);
        self.render_count.set(self.render_count.get() + 1);

        self.unmount_children();
        *self.children.borrow_mut() = nested;

        debug!(tag, render = self.render_count.get(), "rendered component");
        Ok(())
    }

    fn mount_nested(&self, tree: &RenderTree) -> Result<Vec<MountedComponent>> {
        let mut mounted: Vec<MountedComponent> = Vec::new();

        for (id, node) in tree.iter() {
            if id == tree.root() {
                continue;
            }
            let RenderNode::Component(component) = node else {
                continue;
            };
            let Some(definition) = self.env.registry.get(&component.tag_name) else {
                continue;
            };
            let Some(host) = component.reference else {
                continue;
            };

            let inputs = definition
                .inputs()
                .iter()
                .filter_map(|name| {
                    component
                        .attributes
                        .get(name)
                        .map(|value| (name.clone(), value.clone()))
                })
                .collect();

            match mount_in(definition, host, &self.env, inputs) {
                Ok(child) => mounted.push(child),
                Err(e) => {
                    for child in mounted {
                        child.unmount();
                    }
                    return Err(e);
                }
            }
        }

        Ok(mounted)
    }

    fn run_mount_hooks(&self) -> Result<()> {
        {
            let mut instance = self.instance.borrow_mut();
            for name in self.definition.inputs() {
                if let Some(value) = self.inputs.get(name) {
                    instance.on_input_change(name, value)?;
                }
            }
            instance.on_init()?;
        }

        if self.env.options.initial_render && self.render_count.get() == 0 {
            self.render()?;
        }

        if self.render_count.get() > 0 {
            self.instance.borrow_mut().on_view_init()?;
        }
        Ok(())
    }

    /// Only removes this renderer's own subscription; a remounted instance
    /// sharing the scope may already have replaced it.
    fn unsubscribe(&self) {
        let subscription = self.subscription.borrow_mut().take();
        if let (Some(scope), Some(subscriber)) = (&self.scope, subscription) {
            scope.unsubscribe_if(&subscriber);
        }
    }

    fn unmount_children(&self) {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            child.unmount();
        }
    }

    fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        self.unsubscribe();
        self.instance.borrow_mut().on_destroy();
        self.unmount_children();
        debug!(tag = self.definition.tag(), "unmounted component");
    }
}

/// A live component instance bound to a host node.
pub struct MountedComponent {
    renderer: Rc<Renderer>,
}

impl MountedComponent {
    pub fn tag(&self) -> &str {
        self.renderer.definition.tag()
    }

    pub fn host(&self) -> NodeRef {
        self.renderer.host
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.renderer.scope.as_ref()
    }

    /// Completed renders since mount.
    pub fn render_count(&self) -> usize {
        self.renderer.render_count.get()
    }

    /// Tag and host of every currently mounted nested component.
    pub fn nested(&self) -> Vec<(String, NodeRef)> {
        self.renderer
            .children
            .borrow()
            .iter()
            .map(|child| (child.tag().to_string(), child.host()))
            .collect()
    }

    /// Forces a render outside of a scope write.
    pub fn render(&self) -> Result<()> {
        self.renderer.render()
    }

    /// Stops renders, calls `on_destroy` and unmounts nested components.
    pub fn unmount(self) {
        self.renderer.unmount();
    }
}

impl fmt::Debug for MountedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedComponent")
            .field("tag", &self.tag())
            .field("host", &self.host())
            .field("render_count", &self.render_count())
            .finish()
    }
}

/// Mounts `definition` into `host`.
pub fn mount(
    definition: &ComponentDefinition,
    host: NodeRef,
    backend: SharedBackend,
    registry: Rc<Registry>,
    options: QuakeOptions,
) -> Result<MountedComponent> {
    let env = Environment {
        backend,
        registry,
        options,
    };
    mount_in(definition, host, &env, Context::new())
}

fn mount_in(
    definition: &ComponentDefinition,
    host: NodeRef,
    env: &Environment,
    inputs: Context,
) -> Result<MountedComponent> {
    let tag = definition.tag();
    let instance = (definition.factory)();

    let mut declarations = Declarations::default();
    instance.declare(&mut declarations);
    if declarations.scopes.len() > 1 {
        return Err(QuakeError::MultipleScopesDeclared {
            component: tag.to_string(),
            count: declarations.scopes.len(),
        });
    }
    let scope = declarations.scopes.into_iter().next();

    if env.options.validate_templates {
        let mut known: HashSet<String> = declarations.bindings.keys().cloned().collect();
        known.extend(definition.inputs().iter().cloned());
        if let Some(scope) = &scope {
            known.extend(scope.keys());
        }
        for diagnostic in validate_template(definition.template(), &known) {
            warn!(component = tag, "{}", diagnostic);
        }
    }

    let renderer = Rc::new(Renderer {
        definition: definition.clone(),
        host,
        env: env.clone(),
        scope,
        subscription: RefCell::new(None),
        bindings: declarations.bindings,
        inputs,
        instance: RefCell::new(instance),
        children: RefCell::new(Vec::new()),
        render_count: Cell::new(0),
        mounted: Cell::new(true),
    });

    if let Some(scope) = &renderer.scope {
        let weak = Rc::downgrade(&renderer);
        let subscriber: Subscriber = Rc::new(move || match weak.upgrade() {
            Some(renderer) => renderer.render(),
            None => Ok(()),
        });
        scope.subscribe_shared(Rc::clone(&subscriber));
        *renderer.subscription.borrow_mut() = Some(subscriber);
    }

    if let Err(e) = renderer.run_mount_hooks() {
        renderer.mounted.set(false);
        renderer.unsubscribe();
        renderer.unmount_children();
        return Err(e);
    }

    debug!(tag, "mounted component");
    Ok(MountedComponent { renderer })
}
