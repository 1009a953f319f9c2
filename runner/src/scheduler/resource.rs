use parking_lot::{Condvar, Mutex};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    sync::Arc,
};
use thiserror::Error;
use tracing::trace;

/// name of the default counter used by sweeps
pub const CPUS: &str = "cpus";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Resource {0} is not known to the pool")]
    UnknownResource(String),
    #[error("Resource {0} was declared more than once")]
    DuplicateResource(String),
    #[error("Requested {requested} of {resource} but the pool only has a capacity of {capacity}")]
    ResourceRequestExceedsCapacity {
        resource: String,
        requested: u64,
        capacity: u64,
    },
}

/// A named, countable resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub capacity: u64,
    pub available: u64,
}

impl Resource {
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        Self {
            name: name.into(),
            capacity,
            available: capacity,
        }
    }
}

/// amounts of each resource a task needs while it runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirement(BTreeMap<String, u64>);

impl Requirement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cpus(amount: u64) -> Self {
        Self::new().with(CPUS, amount)
    }

    pub fn with(mut self, resource: impl Into<String>, amount: u64) -> Self {
        *self.0.entry(resource.into()).or_insert(0) += amount;
        self
    }

    pub fn get(&self, resource: &str) -> u64 {
        self.0.get(resource).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(name, amount)| (name.as_str(), *amount))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|amount| *amount == 0)
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, amount) in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{name}={amount}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PoolState {
    resources: BTreeMap<String, Resource>,
}

impl PoolState {
    fn fits(&self, requirement: &Requirement) -> bool {
        requirement.iter().all(|(name, amount)| {
            self.resources
                .get(name)
                .is_some_and(|resource| resource.available >= amount)
        })
    }

    fn take(&mut self, requirement: &Requirement) {
        for (name, amount) in requirement.iter() {
            if let Some(resource) = self.resources.get_mut(name) {
                resource.available -= amount;
            }
        }
    }

    fn give_back(&mut self, requirement: &Requirement) {
        for (name, amount) in requirement.iter() {
            let resource = self
                .resources
                .get_mut(name)
                .unwrap_or_else(|| panic!("release of {name} which the pool never held"));

            assert!(
                resource.available + amount <= resource.capacity,
                "release of {amount} {name} would exceed the capacity of {}",
                resource.capacity
            );
            resource.available += amount;
        }
    }
}

#[derive(Debug)]
struct PoolInner {
    state: Mutex<PoolState>,
    released: Condvar,
}

/// Thread safe pool of countable resources.
///
/// Reservations are all-or-nothing: either the whole requirement is granted
/// or nothing is taken from the pool.
#[derive(Debug, Clone)]
pub struct ResourcePool(Arc<PoolInner>);

/// Resources held by a running task. They return to the pool on `release`
/// or when the reservation is dropped, whichever happens first.
#[derive(Debug)]
#[must_use = "dropping a reservation releases it immediately"]
pub struct Reservation {
    pool: Arc<PoolInner>,
    requirement: Requirement,
}

impl Reservation {
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.state.lock().give_back(&self.requirement);
        trace!(requirement = %self.requirement, "Released reservation");
        self.pool.released.notify_all();
    }
}

impl ResourcePool {
    pub fn new<I: IntoIterator<Item = Resource>>(resources: I) -> Result<Self, ResourceError> {
        let mut map = BTreeMap::new();

        for resource in resources {
            if map.contains_key(&resource.name) {
                return Err(ResourceError::DuplicateResource(resource.name));
            }
            map.insert(resource.name.clone(), resource);
        }

        Ok(Self(Arc::new(PoolInner {
            state: Mutex::new(PoolState { resources: map }),
            released: Condvar::new(),
        })))
    }

    /// pool with a single `cpus` counter
    pub fn cpus(capacity: u64) -> Self {
        Self(Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                resources: BTreeMap::from([(CPUS.to_string(), Resource::new(CPUS, capacity))]),
            }),
            released: Condvar::new(),
        }))
    }

    pub fn capacity(&self, resource: &str) -> Option<u64> {
        self.0
            .state
            .lock()
            .resources
            .get(resource)
            .map(|resource| resource.capacity)
    }

    pub fn available(&self, resource: &str) -> Option<u64> {
        self.0
            .state
            .lock()
            .resources
            .get(resource)
            .map(|resource| resource.available)
    }

    /// true if every resource is back at full capacity
    pub fn is_idle(&self) -> bool {
        self.0
            .state
            .lock()
            .resources
            .values()
            .all(|resource| resource.available == resource.capacity)
    }

    /// Verify that a requirement can ever be satisfied by this pool
    pub fn check(&self, requirement: &Requirement) -> Result<(), ResourceError> {
        let state = self.0.state.lock();

        for (name, amount) in requirement.iter() {
            match state.resources.get(name) {
                None => return Err(ResourceError::UnknownResource(name.to_string())),
                Some(resource) if amount > resource.capacity => {
                    return Err(ResourceError::ResourceRequestExceedsCapacity {
                        resource: name.to_string(),
                        requested: amount,
                        capacity: resource.capacity,
                    })
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Take the whole requirement if it currently fits, without blocking
    pub fn try_acquire(&self, requirement: &Requirement) -> Result<Option<Reservation>, ResourceError> {
        self.check(requirement)?;

        let mut state = self.0.state.lock();
        if state.fits(requirement) {
            state.take(requirement);
            Ok(Some(self.reservation(requirement)))
        } else {
            Ok(None)
        }
    }

    /// Block until the whole requirement fits, then take it
    pub fn acquire(&self, requirement: &Requirement) -> Result<Reservation, ResourceError> {
        self.check(requirement)?;

        let mut state = self.0.state.lock();
        while !state.fits(requirement) {
            self.0.released.wait(&mut state);
        }
        state.take(requirement);

        Ok(self.reservation(requirement))
    }

    /// Return a reservation to the pool.
    /// Panics if the reservation was taken from another pool.
    pub fn release(&self, reservation: Reservation) {
        assert!(
            Arc::ptr_eq(&self.0, &reservation.pool),
            "reservation released into a pool it was not acquired from"
        );
        drop(reservation);
    }

    fn reservation(&self, requirement: &Requirement) -> Reservation {
        trace!(requirement = %requirement, "Acquired reservation");
        Reservation {
            pool: self.0.clone(),
            requirement: requirement.clone(),
        }
    }
}
