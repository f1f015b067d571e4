//! Dependency-aware capability loader.
//!
//! Capabilities ("modules") are registered as named factories with declared
//! dependencies. [`ModuleLoader::load_module`] instantiates a module on first
//! use, after loading its transitive dependencies depth-first in declaration
//! order, runs its [`Module::initialize`] hook, and memoizes the instance.
//!
//! The whole "check cache, else construct and cache" sequence runs under one
//! async mutex, so concurrent loads of the same name construct it once.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use async_trait::async_trait;
use protocol::{ModuleName, ToolkitError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Module contract
// ---------------------------------------------------------------------------

/// Conversion to [`Any`] for typed access to loaded modules.
///
/// Implemented automatically for every module type.
pub trait IntoAnyModule: Any + Send + Sync {
    /// Converts the shared instance into a shared [`Any`].
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> IntoAnyModule for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A lazily instantiated capability unit.
#[async_trait]
pub trait Module: IntoAnyModule {
    /// Runs once, after every dependency has been initialized.
    ///
    /// Called while the loader holds its load lock: calling back into the
    /// same [`ModuleLoader`] from here deadlocks. Take dependencies from the
    /// factory's `deps` instead.
    async fn initialize(&self) -> Result<(), ToolkitError> {
        Ok(())
    }

    /// Runs once, when the module is unloaded.
    async fn dispose(&self) -> Result<(), ToolkitError> {
        Ok(())
    }
}

/// Lifecycle of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Factory registered; no live instance.
    Registered,
    /// Factory ran; `initialize` in progress.
    Initializing,
    /// Live, memoized instance.
    Initialized,
    /// Instance disposed and dropped; a later load creates a new one.
    Disposed,
}

/// Already-loaded dependencies handed to a factory.
#[derive(Default, Clone)]
pub struct ModuleDependencies {
    modules: HashMap<ModuleName, Arc<dyn Module>>,
}

impl ModuleDependencies {
    /// Returns the dependency named `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    /// Returns the dependency named `name` as its concrete type.
    pub fn get_as<T: Module>(&self, name: &str) -> Result<Arc<T>, ToolkitError> {
        let module = self.get(name).ok_or_else(|| {
            ToolkitError::configuration(format!("module '{name}' is not a declared dependency"))
        })?;
        downcast(name, module)
    }

    /// Number of dependencies supplied.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if the module declared no dependencies.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Constructs a module from its loaded dependencies.
pub type ModuleFactory =
    Arc<dyn Fn(&ModuleDependencies) -> Result<Arc<dyn Module>, ToolkitError> + Send + Sync>;

#[derive(Clone)]
struct ModuleDescriptor {
    name: ModuleName,
    dependencies: Vec<ModuleName>,
    factory: ModuleFactory,
}

/// Outcome of [`ModuleLoader::validate_dependencies`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    /// `false` if any error was found.
    pub valid: bool,
    /// One entry per problem, in registration order.
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    descriptors: HashMap<ModuleName, ModuleDescriptor>,
    order: Vec<ModuleName>,
}

/// Registry of module factories plus their memoized instances.
#[derive(Default)]
pub struct ModuleLoader {
    registry: RwLock<Registry>,
    states: Mutex<HashMap<ModuleName, ModuleState>>,
    loaded: tokio::sync::Mutex<HashMap<ModuleName, Arc<dyn Module>>>,
}

impl ModuleLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name` with its declared `dependencies`.
    ///
    /// Registration is permanent; registering a name twice is a
    /// configuration error. Dependencies need not be registered yet, but must
    /// be by the time the module is loaded.
    pub fn register_module_factory<F>(
        &self,
        name: &str,
        dependencies: &[&str],
        factory: F,
    ) -> Result<(), ToolkitError>
    where
        F: Fn(&ModuleDependencies) -> Result<Arc<dyn Module>, ToolkitError>
            + Send
            + Sync
            + 'static,
    {
        let name = ModuleName::new(name)
            .ok_or_else(|| ToolkitError::configuration("module name must not be empty"))?;
        let dependencies = dependencies
            .iter()
            .map(|dep| {
                ModuleName::new(*dep).ok_or_else(|| {
                    ToolkitError::configuration(format!(
                        "module '{name}' declares an empty dependency name"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.descriptors.contains_key(&name) {
            return Err(ToolkitError::configuration(format!(
                "module '{name}' is already registered"
            )));
        }
        debug!(module = %name, dependencies = ?dependencies, "module factory registered");
        registry.order.push(name.clone());
        registry.descriptors.insert(
            name.clone(),
            ModuleDescriptor {
                name: name.clone(),
                dependencies,
                factory: Arc::new(factory),
            },
        );
        drop(registry);

        self.states().insert(name, ModuleState::Registered);
        Ok(())
    }

    /// Returns the memoized instance of `name`, loading it and its
    /// dependencies first if needed.
    ///
    /// Holds the load lock across factories and `initialize` hooks, so
    /// neither may call back into this loader.
    pub async fn load_module(&self, name: &str) -> Result<Arc<dyn Module>, ToolkitError> {
        let mut loaded = self.loaded.lock().await;
        if let Some(instance) = loaded.get(name) {
            return Ok(Arc::clone(instance));
        }

        for descriptor in self.load_order(name)? {
            if loaded.contains_key(&descriptor.name) {
                continue;
            }
            let dependencies = ModuleDependencies {
                modules: descriptor
                    .dependencies
                    .iter()
                    .filter_map(|dep| loaded.get(dep).map(|m| (dep.clone(), Arc::clone(m))))
                    .collect(),
            };

            self.set_state(&descriptor.name, ModuleState::Initializing);
            info!(module = %descriptor.name, "initializing module");

            let instance = match (descriptor.factory)(&dependencies) {
                Ok(instance) => instance,
                Err(err) => {
                    self.set_state(&descriptor.name, ModuleState::Registered);
                    return Err(err);
                }
            };
            if let Err(err) = instance.initialize().await {
                self.set_state(&descriptor.name, ModuleState::Registered);
                warn!(module = %descriptor.name, error = %err, "module initialization failed");
                return Err(ToolkitError::Module {
                    module: descriptor.name.to_string(),
                    message: format!("initialization failed: {err}"),
                });
            }

            loaded.insert(descriptor.name.clone(), instance);
            self.set_state(&descriptor.name, ModuleState::Initialized);
        }

        loaded.get(name).cloned().ok_or_else(|| ToolkitError::Internal {
            message: format!("module '{name}' missing after load"),
        })
    }

    /// Loads `name` and returns it as its concrete type.
    pub async fn load_as<T: Module>(&self, name: &str) -> Result<Arc<T>, ToolkitError> {
        let module = self.load_module(name).await?;
        downcast(name, module)
    }

    /// Loads every name in `names`, in order.
    pub async fn load_modules(
        &self,
        names: &[&str],
    ) -> Result<HashMap<ModuleName, Arc<dyn Module>>, ToolkitError> {
        let mut modules = HashMap::with_capacity(names.len());
        for name in names {
            let module = self.load_module(name).await?;
            let key = ModuleName::new(*name)
                .ok_or_else(|| ToolkitError::configuration("module name must not be empty"))?;
            modules.insert(key, module);
        }
        Ok(modules)
    }

    /// Disposes and drops the instance of `name`.
    ///
    /// Refuses while another loaded module declares `name` as a dependency.
    /// Returns `Ok(false)` if `name` was not loaded.
    pub async fn unload_module(&self, name: &str) -> Result<bool, ToolkitError> {
        let mut loaded = self.loaded.lock().await;
        let Some(instance) = loaded.get(name).cloned() else {
            return Ok(false);
        };

        let dependents: Vec<String> = {
            let registry = self.registry();
            loaded
                .keys()
                .filter(|other| other.as_str() != name)
                .filter(|other| {
                    registry
                        .descriptors
                        .get(*other)
                        .is_some_and(|d| d.dependencies.iter().any(|dep| dep.as_str() == name))
                })
                .map(ToString::to_string)
                .collect()
        };
        if !dependents.is_empty() {
            return Err(ToolkitError::Module {
                module: name.to_string(),
                message: format!("still required by: {}", dependents.join(", ")),
            });
        }

        instance.dispose().await.map_err(|err| ToolkitError::Module {
            module: name.to_string(),
            message: format!("dispose failed: {err}"),
        })?;
        if let Some((key, _)) = loaded.remove_entry(name) {
            self.set_state(&key, ModuleState::Disposed);
        }
        info!(module = name, "module unloaded");
        Ok(true)
    }

    /// Disposes every loaded module in reverse registration order.
    ///
    /// All modules are dropped even if some `dispose` hooks fail; the first
    /// failure is returned after the sweep.
    pub async fn unload_all(&self) -> Result<(), ToolkitError> {
        let mut loaded = self.loaded.lock().await;
        let order: Vec<ModuleName> = self.registry().order.iter().rev().cloned().collect();

        let mut first_error = None;
        for name in order {
            let Some(instance) = loaded.remove(&name) else {
                continue;
            };
            if let Err(err) = instance.dispose().await {
                warn!(module = %name, error = %err, "dispose failed during unload_all");
                first_error.get_or_insert(ToolkitError::Module {
                    module: name.to_string(),
                    message: format!("dispose failed: {err}"),
                });
            }
            self.set_state(&name, ModuleState::Disposed);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Checks the whole registered graph for cycles and unregistered
    /// dependencies. Intended to run once at startup.
    pub fn validate_dependencies(&self) -> DependencyReport {
        fn visit(
            name: &ModuleName,
            registry: &Registry,
            visited: &mut HashSet<ModuleName>,
            rec_stack: &mut HashSet<ModuleName>,
            errors: &mut Vec<String>,
        ) {
            visited.insert(name.clone());
            rec_stack.insert(name.clone());

            if let Some(descriptor) = registry.descriptors.get(name) {
                for dep in &descriptor.dependencies {
                    if !registry.descriptors.contains_key(dep) {
                        errors.push(format!(
                            "module '{name}' depends on unregistered module '{dep}'"
                        ));
                    } else if rec_stack.contains(dep) {
                        errors.push(format!("circular dependency detected involving module: {dep}"));
                    } else if !visited.contains(dep) {
                        visit(dep, registry, visited, rec_stack, errors);
                    }
                }
            }

            rec_stack.remove(name);
        }

        let registry = self.registry();
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut errors = Vec::new();
        for name in &registry.order {
            if !visited.contains(name) {
                visit(name, &registry, &mut visited, &mut rec_stack, &mut errors);
            }
        }

        if !errors.is_empty() {
            warn!(errors = ?errors, "module dependency validation failed");
        }
        DependencyReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Returns the lifecycle state of `name`, or `None` if unregistered.
    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.states().get(name).copied()
    }

    /// Returns `true` if `name` has a live instance.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.module_state(name) == Some(ModuleState::Initialized)
    }

    /// Names of modules with a live instance, in registration order.
    pub fn loaded_modules(&self) -> Vec<ModuleName> {
        let states = self.states();
        self.registry()
            .order
            .iter()
            .filter(|name| states.get(*name) == Some(&ModuleState::Initialized))
            .cloned()
            .collect()
    }

    /// Names of every registered module, in registration order.
    pub fn registered_modules(&self) -> Vec<ModuleName> {
        self.registry().order.clone()
    }

    /// Depth-first post-order over `root`'s dependencies, `root` last.
    fn load_order(&self, root: &str) -> Result<Vec<ModuleDescriptor>, ToolkitError> {
        fn visit(
            name: &str,
            registry: &Registry,
            visited: &mut HashSet<ModuleName>,
            stack: &mut Vec<ModuleName>,
            order: &mut Vec<ModuleDescriptor>,
        ) -> Result<(), ToolkitError> {
            if stack.iter().any(|on_stack| on_stack.as_str() == name) {
                return Err(ToolkitError::configuration(format!(
                    "circular dependency detected involving module: {name}"
                )));
            }
            if visited.contains(name) {
                return Ok(());
            }
            let descriptor = registry.descriptors.get(name).ok_or_else(|| {
                ToolkitError::configuration(format!("factory not found for module: {name}"))
            })?;

            stack.push(descriptor.name.clone());
            for dep in &descriptor.dependencies {
                visit(dep.as_str(), registry, visited, stack, order)?;
            }
            stack.pop();

            visited.insert(descriptor.name.clone());
            order.push(descriptor.clone());
            Ok(())
        }

        let registry = self.registry();
        let mut order = Vec::new();
        visit(
            root,
            &registry,
            &mut HashSet::new(),
            &mut Vec::new(),
            &mut order,
        )?;
        Ok(order)
    }

    fn set_state(&self, name: &ModuleName, state: ModuleState) {
        self.states().insert(name.clone(), state);
    }

    fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn states(&self) -> MutexGuard<'_, HashMap<ModuleName, ModuleState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("registered", &self.registered_modules())
            .field("loaded", &self.loaded_modules())
            .finish()
    }
}

fn downcast<T: Module>(name: &str, module: Arc<dyn Module>) -> Result<Arc<T>, ToolkitError> {
    module.into_any().downcast::<T>().map_err(|_| {
        ToolkitError::configuration(format!(
            "module '{name}' is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Appends `init:<name>` / `dispose:<name>` to a shared journal.
    struct Journaled {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Module for Journaled {
        async fn initialize(&self) -> Result<(), ToolkitError> {
            self.journal.lock().unwrap().push(format!("init:{}", self.name));
            Ok(())
        }

        async fn dispose(&self) -> Result<(), ToolkitError> {
            self.journal.lock().unwrap().push(format!("dispose:{}", self.name));
            Ok(())
        }
    }

    fn register(
        loader: &ModuleLoader,
        name: &'static str,
        deps: &[&str],
        journal: &Arc<Mutex<Vec<String>>>,
    ) {
        let journal = Arc::clone(journal);
        loader
            .register_module_factory(name, deps, move |_| {
                Ok(Arc::new(Journaled {
                    name,
                    journal: Arc::clone(&journal),
                }) as Arc<dyn Module>)
            })
            .unwrap();
    }

    #[tokio::test]
    async fn dependencies_initialize_first_in_declaration_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let loader = ModuleLoader::new();
        register(&loader, "app", &["comments", "labels"], &journal);
        register(&loader, "comments", &["issues"], &journal);
        register(&loader, "labels", &["issues"], &journal);
        register(&loader, "issues", &[], &journal);

        loader.load_module("app").await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            ["init:issues", "init:comments", "init:labels", "init:app"]
        );
        let loaded: Vec<_> = loader.loaded_modules().iter().map(|n| n.to_string()).collect();
        assert_eq!(loaded, ["app", "comments", "labels", "issues"]);
    }

    #[tokio::test]
    async fn repeated_loads_return_the_same_instance() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let loader = ModuleLoader::new();
        let counter = Arc::clone(&constructed);
        loader
            .register_module_factory("issues", &[], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Journaled {
                    name: "issues",
                    journal: Arc::default(),
                }) as Arc<dyn Module>)
            })
            .unwrap();

        let first = loader.load_module("issues").await.unwrap();
        let second = loader.load_module("issues").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_factory_is_a_configuration_error() {
        let loader = ModuleLoader::new();
        let err = loader.load_module("nope").await.err().expect("expected Err");
        assert_eq!(
            err,
            ToolkitError::configuration("factory not found for module: nope")
        );

        let journal = Arc::new(Mutex::new(Vec::new()));
        register(&loader, "comments", &["issues"], &journal);
        let err = loader.load_module("comments").await.err().expect("expected Err");
        assert!(err.to_string().contains("factory not found for module: issues"));
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lazy_load_of_a_cycle_fails_instead_of_recursing() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let loader = ModuleLoader::new();
        register(&loader, "a", &["b"], &journal);
        register(&loader, "b", &["a"], &journal);

        let err = loader.load_module("a").await.err().expect("expected Err");
        assert!(matches!(err, ToolkitError::Configuration { .. }));
        assert!(err.to_string().contains("circular dependency detected"));
        assert!(journal.lock().unwrap().is_empty());
    }

    #[test]
    fn validation_reports_cycles_and_unregistered_dependencies() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let loader = ModuleLoader::new();
        register(&loader, "a", &["b"], &journal);
        register(&loader, "b", &["c"], &journal);
        register(&loader, "c", &["a"], &journal);
        register(&loader, "d", &["ghost"], &journal);

        let report = loader.validate_dependencies();
        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.starts_with("circular dependency detected involving module: ")));
        assert!(report
            .errors
            .contains(&"module 'd' depends on unregistered module 'ghost'".to_string()));
    }

    #[test]
    fn acyclic_graph_validates() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let loader = ModuleLoader::new();
        register(&loader, "issues", &[], &journal);
        register(&loader, "comments", &["issues"], &journal);
        register(&loader, "labels", &["issues"], &journal);

        let report = loader.validate_dependencies();
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let loader = ModuleLoader::new();
        register(&loader, "issues", &[], &journal);
        let err = loader
            .register_module_factory("issues", &[], |_| {
                Err(ToolkitError::configuration("unused"))
            })
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn unload_refuses_while_a_dependent_is_loaded() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let loader = ModuleLoader::new();
        register(&loader, "issues", &[], &journal);
        register(&loader, "comments", &["issues"], &journal);
        loader.load_module("comments").await.unwrap();

        let err = loader.unload_module("issues").await.unwrap_err();
        assert!(matches!(err, ToolkitError::Module { .. }));
        assert!(loader.is_loaded("issues"));

        assert!(loader.unload_module("comments").await.unwrap());
        assert!(loader.unload_module("issues").await.unwrap());
        assert!(!loader.unload_module("issues").await.unwrap());
        assert_eq!(loader.module_state("issues"), Some(ModuleState::Disposed));
        assert_eq!(
            journal.lock().unwrap()[2..],
            ["dispose:comments", "dispose:issues"]
        );
    }

    #[tokio::test]
    async fn unload_all_disposes_in_reverse_registration_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let loader = ModuleLoader::new();
        register(&loader, "issues", &[], &journal);
        register(&loader, "labels", &["issues"], &journal);
        register(&loader, "comments", &["issues"], &journal);
        loader.load_modules(&["comments", "labels"]).await.unwrap();
        journal.lock().unwrap().clear();

        loader.unload_all().await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            ["dispose:comments", "dispose:labels", "dispose:issues"]
        );
        assert!(loader.loaded_modules().is_empty());
    }

    /// Journals its disposal, then reports a failure.
    struct FailsToDispose {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Module for FailsToDispose {
        async fn dispose(&self) -> Result<(), ToolkitError> {
            self.journal.lock().unwrap().push(format!("dispose:{}", self.name));
            Err(ToolkitError::Network {
                message: format!("{} webhook unreachable", self.name),
            })
        }
    }

    #[tokio::test]
    async fn unload_all_sweeps_past_failing_dispose_and_returns_the_first_failure() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let loader = ModuleLoader::new();
        register(&loader, "issues", &[], &journal);
        for name in ["labels", "comments"] {
            let journal = Arc::clone(&journal);
            loader
                .register_module_factory(name, &["issues"], move |_| {
                    Ok(Arc::new(FailsToDispose {
                        name,
                        journal: Arc::clone(&journal),
                    }) as Arc<dyn Module>)
                })
                .unwrap();
        }
        loader.load_modules(&["labels", "comments"]).await.unwrap();
        journal.lock().unwrap().clear();

        let err = loader.unload_all().await.unwrap_err();

        match err {
            ToolkitError::Module { module, .. } => assert_eq!(module, "comments"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            *journal.lock().unwrap(),
            ["dispose:comments", "dispose:labels", "dispose:issues"]
        );
        for name in ["issues", "labels", "comments"] {
            assert_eq!(loader.module_state(name), Some(ModuleState::Disposed));
        }
        assert!(loader.loaded_modules().is_empty());
    }

    #[derive(Debug)]
    struct FailsToStart;

    #[async_trait]
    impl Module for FailsToStart {
        async fn initialize(&self) -> Result<(), ToolkitError> {
            Err(ToolkitError::configuration("missing team id"))
        }
    }

    #[tokio::test]
    async fn failed_initialization_leaves_module_unloaded() {
        let loader = ModuleLoader::new();
        loader
            .register_module_factory("cycles", &[], |_| Ok(Arc::new(FailsToStart) as Arc<dyn Module>))
            .unwrap();

        let err = loader.load_module("cycles").await.err().expect("expected Err");
        assert!(matches!(err, ToolkitError::Module { .. }));
        assert_eq!(loader.module_state("cycles"), Some(ModuleState::Registered));
        assert!(!loader.is_loaded("cycles"));
    }

    #[tokio::test]
    async fn typed_access_downcasts() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let loader = ModuleLoader::new();
        register(&loader, "issues", &[], &journal);

        let issues = loader.load_as::<Journaled>("issues").await.unwrap();
        assert_eq!(issues.name, "issues");

        let err = loader.load_as::<FailsToStart>("issues").await.unwrap_err();
        assert!(matches!(err, ToolkitError::Configuration { .. }));
    }
}
