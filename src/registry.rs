use crate::contract::{Contract, TypeShape, TypeToken};
use crate::error::ArborError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// Supplies the pre-resolved shape of a type on demand.
pub trait ShapeResolver: Send + Sync {
    fn resolve_shape(&self, ty: &TypeToken) -> Result<TypeShape, ArborError>;
}

impl<F> ShapeResolver for F
where
    F: Fn(&TypeToken) -> Result<TypeShape, ArborError> + Send + Sync,
{
    fn resolve_shape(&self, ty: &TypeToken) -> Result<TypeShape, ArborError> {
        self(ty)
    }
}

/// Resolver over a fixed table of shapes registered up front.
#[derive(Debug, Default, Clone)]
pub struct StaticShapeResolver {
    shapes: HashMap<TypeToken, TypeShape>,
}

impl StaticShapeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, shape: TypeShape) -> &mut Self {
        self.shapes.insert(shape.token.clone(), shape);
        self
    }

    pub fn with(mut self, shape: TypeShape) -> Self {
        self.register(shape);
        self
    }
}

impl ShapeResolver for StaticShapeResolver {
    fn resolve_shape(&self, ty: &TypeToken) -> Result<TypeShape, ArborError> {
        self.shapes
            .get(ty)
            .cloned()
            .ok_or_else(|| ArborError::ShapeUnavailable(ty.name().to_string()))
    }
}

pub type ContractConfigurator = Arc<dyn Fn(&mut Contract) + Send + Sync>;

/// Shared, lazily filled cache of contracts keyed by type.
///
/// Contracts are built outside the lock. When two threads race on the same
/// type, the first to publish wins and every caller gets that instance.
pub struct ContractRegistry {
    resolver: Arc<dyn ShapeResolver>,
    configurators: Vec<ContractConfigurator>,
    contracts: RwLock<HashMap<TypeToken, Arc<Contract>>>,
}

impl ContractRegistry {
    pub fn new(resolver: impl ShapeResolver + 'static) -> Self {
        Self::from_arc(Arc::new(resolver))
    }

    pub fn from_arc(resolver: Arc<dyn ShapeResolver>) -> Self {
        Self {
            resolver,
            configurators: Vec::new(),
            contracts: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a hook run on every freshly built contract before it is
    /// published, e.g. to attach converters or callbacks.
    pub fn with_configurator<F>(mut self, configure: F) -> Self
    where
        F: Fn(&mut Contract) + Send + Sync + 'static,
    {
        self.configurators.push(Arc::new(configure));
        self
    }

    pub fn resolve(&self, ty: &TypeToken) -> Result<Arc<Contract>, ArborError> {
        if ty.is_absent() {
            return Err(ArborError::InvalidArgument(
                "cannot resolve a contract for an absent type".to_string(),
            ));
        }
        if let Some(cached) = self.get(ty) {
            trace!(ty = %ty, "contract cache hit");
            return Ok(cached);
        }

        let shape = self.resolver.resolve_shape(ty)?;
        if shape.token != *ty {
            return Err(ArborError::Configuration(format!(
                "resolver returned the shape of {} when asked for {}",
                shape.token, ty
            )));
        }
        let mut contract = Contract::new(&shape)?;
        for configure in &self.configurators {
            configure(&mut contract);
        }
        let built = Arc::new(contract);

        let mut table = self.write();
        let published = table.entry(ty.clone()).or_insert_with(|| Arc::clone(&built));
        if Arc::ptr_eq(published, &built) {
            debug!(ty = %ty, kind = ?built.kind(), "contract published");
        } else {
            trace!(ty = %ty, "discarding contract built by a losing thread");
        }
        Ok(Arc::clone(published))
    }

    /// Convenience for Rust types.
    pub fn resolve_type<T: ?Sized + 'static>(&self) -> Result<Arc<Contract>, ArborError> {
        self.resolve(&TypeToken::of::<T>())
    }

    pub fn get(&self, ty: &TypeToken) -> Option<Arc<Contract>> {
        self.read().get(ty).cloned()
    }

    pub fn contains(&self, ty: &TypeToken) -> bool {
        self.read().contains_key(ty)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drops every cached contract. Contracts already handed out stay valid.
    pub fn reset(&self) {
        let mut table = self.write();
        let dropped = table.len();
        table.clear();
        debug!(dropped, "contract cache reset");
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TypeToken, Arc<Contract>>> {
        self.contracts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TypeToken, Arc<Contract>>> {
        self.contracts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.read().keys().map(TypeToken::name))
            .finish()
    }
}
