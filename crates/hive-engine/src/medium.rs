//! Communication and sensing media.
//!
//! A medium keeps its own view of the entities that participate in it
//! (LEDs, radios, range-and-bearing emitters) and refreshes that view
//! once per tick, after physics has moved everything.

use std::any::Any;

use hive_core::{EntityKey, MediumError, TickId};
use tracing::trace;

use crate::config::{ConfigError, MediumConfig};
use crate::error::StepError;
use crate::registry::EntityRegistry;

/// A shared sensing or communication channel.
pub trait Medium: Any + Send + 'static {
    /// Identifier, unique within a [`MediumSet`]. Entities name it in
    /// [`Entity::medium`](crate::Entity::medium).
    fn id(&self) -> &str;

    /// Configure the medium before the first tick.
    fn init(&mut self, _config: &MediumConfig) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Refresh internal state from the current entity positions.
    fn update(&mut self, ctx: &MediumContext<'_>) -> Result<(), MediumError>;

    /// Return to the state after `init`.
    fn reset(&mut self) {}

    /// Release resources.
    fn destroy(&mut self) {}
}

impl dyn Medium {
    /// Downcast to a concrete medium type.
    pub fn downcast_ref<T: Medium>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    /// Downcast to a concrete medium type, mutably.
    pub fn downcast_mut<T: Medium>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut::<T>()
    }
}

/// What a medium sees during its update.
#[derive(Clone, Copy)]
pub struct MediumContext<'a> {
    tick: TickId,
    medium: &'a str,
    registry: &'a EntityRegistry,
}

impl<'a> MediumContext<'a> {
    /// Context for `medium` at `tick`.
    pub fn new(tick: TickId, medium: &'a str, registry: &'a EntityRegistry) -> Self {
        Self {
            tick,
            medium,
            registry,
        }
    }

    /// Tick being computed.
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// Entities participating in this medium, in insertion order.
    pub fn members(&self) -> &'a [EntityKey] {
        self.registry.medium_members(self.medium)
    }

    /// The entity registry.
    pub fn registry(&self) -> &'a EntityRegistry {
        self.registry
    }
}

impl std::fmt::Debug for MediumContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediumContext")
            .field("tick", &self.tick)
            .field("medium", &self.medium)
            .field("members", &self.members().len())
            .finish()
    }
}

/// Every medium of a simulation, updated in insertion order.
#[derive(Default)]
pub struct MediumSet {
    media: Vec<Box<dyn Medium>>,
}

impl MediumSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a medium. It is initialised later by
    /// [`init_all`](Self::init_all).
    pub fn add(&mut self, medium: Box<dyn Medium>) -> Result<(), ConfigError> {
        if self.media.iter().any(|m| m.id() == medium.id()) {
            return Err(ConfigError::DuplicateMedium {
                id: medium.id().to_owned(),
            });
        }
        self.media.push(medium);
        Ok(())
    }

    /// Initialise every medium with `config`, in insertion order.
    pub fn init_all(&mut self, config: &MediumConfig) -> Result<(), ConfigError> {
        for medium in &mut self.media {
            medium.init(config)?;
        }
        Ok(())
    }

    /// Number of media.
    pub fn len(&self) -> usize {
        self.media.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }

    /// Medium ids in update order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.media.iter().map(|m| m.id())
    }

    /// Look up a medium by id.
    pub fn medium(&self, id: &str) -> Option<&dyn Medium> {
        self.media.iter().find(|m| m.id() == id).map(|m| &**m)
    }

    /// Look up a medium by id and downcast it to `M`.
    pub fn get<M: Medium>(&self, id: &str) -> Option<&M> {
        self.medium(id)?.downcast_ref::<M>()
    }

    /// Look up a medium by id and downcast it to `M`, mutably.
    pub fn get_mut<M: Medium>(&mut self, id: &str) -> Option<&mut M> {
        self.media
            .iter_mut()
            .find(|m| m.id() == id)?
            .downcast_mut::<M>()
    }

    /// The first medium of type `M`.
    pub fn find<M: Medium>(&self) -> Option<&M> {
        self.media.iter().find_map(|m| m.downcast_ref::<M>())
    }

    /// The first medium of type `M`, mutably.
    pub fn find_mut<M: Medium>(&mut self) -> Option<&mut M> {
        self.media.iter_mut().find_map(|m| m.downcast_mut::<M>())
    }

    /// Update every medium in order. Stops at the first failure.
    pub fn update(&mut self, registry: &EntityRegistry, tick: TickId) -> Result<(), StepError> {
        for medium in &mut self.media {
            let id = medium.id().to_owned();
            let ctx = MediumContext::new(tick, &id, registry);
            trace!(medium = %id, members = ctx.members().len(), "medium update");
            medium
                .update(&ctx)
                .map_err(|source| StepError::Medium { medium: id.clone(), source })?;
        }
        Ok(())
    }

    /// Reset every medium.
    pub fn reset(&mut self) {
        for medium in &mut self.media {
            medium.reset();
        }
    }

    /// Destroy every medium.
    pub fn destroy(&mut self) {
        for medium in &mut self.media {
            medium.destroy();
        }
    }
}

impl std::fmt::Debug for MediumSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediumSet")
            .field("media", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        id: &'static str,
        updates: Vec<(TickId, usize)>,
        fail: bool,
    }

    impl Medium for Counting {
        fn id(&self) -> &str {
            self.id
        }
        fn update(&mut self, ctx: &MediumContext<'_>) -> Result<(), MediumError> {
            if self.fail {
                return Err(MediumError::UpdateFailed {
                    reason: "jammed".into(),
                });
            }
            self.updates.push((ctx.tick(), ctx.members().len()));
            Ok(())
        }
        fn reset(&mut self) {
            self.updates.clear();
        }
    }

    fn counting(id: &'static str) -> Box<dyn Medium> {
        Box::new(Counting {
            id,
            updates: Vec::new(),
            fail: false,
        })
    }

    struct Picky;

    impl Medium for Picky {
        fn id(&self) -> &str {
            "picky"
        }
        fn init(&mut self, config: &MediumConfig) -> Result<(), ConfigError> {
            if config.buckets < 100 {
                return Err(ConfigError::MediumInit {
                    id: "picky".into(),
                    reason: "too few buckets".into(),
                });
            }
            Ok(())
        }
        fn update(&mut self, _: &MediumContext<'_>) -> Result<(), MediumError> {
            Ok(())
        }
    }

    #[test]
    fn init_failure_is_reported() {
        let mut set = MediumSet::new();
        set.add(Box::new(Picky)).unwrap();
        set.init_all(&MediumConfig::default()).unwrap();
        let small = MediumConfig {
            buckets: 10,
            ..MediumConfig::default()
        };
        assert!(matches!(
            set.init_all(&small),
            Err(ConfigError::MediumInit { .. })
        ));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut set = MediumSet::default();
        set.add(counting("leds")).unwrap();
        assert_eq!(
            set.add(counting("leds")),
            Err(ConfigError::DuplicateMedium { id: "leds".into() })
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn update_reaches_every_medium() {
        let mut set = MediumSet::default();
        set.add(counting("leds")).unwrap();
        set.add(counting("radio")).unwrap();
        let registry = EntityRegistry::new();
        set.update(&registry, TickId(2)).unwrap();

        let leds = set.get::<Counting>("leds").unwrap();
        assert_eq!(leds.updates, vec![(TickId(2), 0)]);
        assert_eq!(set.ids().collect::<Vec<_>>(), vec!["leds", "radio"]);

        set.reset();
        assert!(set.find::<Counting>().unwrap().updates.is_empty());
    }

    #[test]
    fn failure_names_the_medium() {
        let mut set = MediumSet::default();
        set.add(Box::new(Counting {
            id: "radio",
            updates: Vec::new(),
            fail: true,
        }))
        .unwrap();
        let err = set.update(&EntityRegistry::new(), TickId(0)).unwrap_err();
        assert!(matches!(err, StepError::Medium { ref medium, .. } if medium == "radio"));
    }
}
