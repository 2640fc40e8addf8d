//! Application entry point.

use std::rc::Rc;
use tracing::info;

use crate::backend::{NodeRef, SharedBackend};
use crate::component::{mount, ComponentDefinition, MountedComponent, Registry};
use crate::error::{QuakeError, Result};
use crate::options::QuakeOptions;

pub struct QuakeInit {
    pub components: Vec<ComponentDefinition>,
    /// Tag of the component mounted into the root.
    pub bootstrap: String,
    pub options: QuakeOptions,
}

/// A validated set of components ready to be started.
#[derive(Debug)]
pub struct QuakeApp {
    registry: Rc<Registry>,
    bootstrap: String,
    options: QuakeOptions,
}

impl QuakeApp {
    pub fn new(init: QuakeInit) -> Result<Self> {
        let mut registry = Registry::new();
        for definition in init.components {
            registry.register(definition)?;
        }
        if !registry.contains(&init.bootstrap) {
            return Err(QuakeError::UnknownComponent { tag: init.bootstrap });
        }

        Ok(Self {
            registry: Rc::new(registry),
            bootstrap: init.bootstrap,
            options: init.options,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &QuakeOptions {
        &self.options
    }

    /// Mounts the bootstrap component into `root`.
    pub fn start(&self, backend: SharedBackend, root: NodeRef) -> Result<AppHandle> {
        let definition =
            self.registry
                .get(&self.bootstrap)
                .ok_or_else(|| QuakeError::UnknownComponent {
                    tag: self.bootstrap.clone(),
                })?;

        info!(
            bootstrap = %self.bootstrap,
            components = self.registry.len(),
            "starting quake app"
        );

        let root = mount(
            definition,
            root,
            backend,
            Rc::clone(&self.registry),
            self.options.clone(),
        )?;
        Ok(AppHandle { root })
    }
}

/// Handle to a started app. Dropping it stops renders; [`AppHandle::destroy`]
/// additionally runs every `on_destroy` hook.
#[derive(Debug)]
pub struct AppHandle {
    root: MountedComponent,
}

impl AppHandle {
    pub fn root(&self) -> &MountedComponent {
        &self.root
    }

    pub fn destroy(self) {
        self.root.unmount();
    }
}
