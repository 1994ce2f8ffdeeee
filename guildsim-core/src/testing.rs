//! Test world construction helpers.

use crate::resources::{PerHour, Resources};
use crate::state::{
    Guild, GenerationState, Location, OwnerRef, Territory, WorldState, NONE_TAG,
};

pub struct WorldStateBuilder {
    state: WorldState,
}

impl WorldStateBuilder {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            state: WorldState::default(),
        }
    }

    pub fn with_guild(mut self, name: &str, tag: &str) -> Self {
        self.state
            .guilds
            .insert(tag.to_string(), Guild::new(name, tag));
        self
    }

    /// Add a territory owned by `tag` (pass [`NONE_TAG`] for unowned).
    /// Generation defaults to zero; see [`with_generation`].
    ///
    /// [`with_generation`]: WorldStateBuilder::with_generation
    pub fn with_territory(mut self, name: &str, tag: &str) -> Self {
        let mut territory = Territory::new(name, PerHour::default(), Location::default());
        if tag != NONE_TAG {
            let guild_name = self
                .state
                .guild(tag)
                .map(|g| g.name.clone())
                .unwrap_or_else(|| tag.to_string());
            territory.guild = OwnerRef {
                tag: tag.to_string(),
                name: guild_name,
            };
        }
        self.state.territories.insert(name.to_string(), territory);
        self
    }

    pub fn with_hq(mut self, name: &str) -> Self {
        if let Some(territory) = self.state.territory_mut(name) {
            territory.options.is_hq = true;
        }
        self
    }

    /// Connect two territories (both directions).
    pub fn with_link(mut self, a: &str, b: &str) -> Self {
        if let Some(territory) = self.state.territory_mut(a) {
            territory.links.direct.insert(b.to_string());
        }
        if let Some(territory) = self.state.territory_mut(b) {
            territory.links.direct.insert(a.to_string());
        }
        self
    }

    /// Set base generation, per hour.
    pub fn with_generation(mut self, name: &str, per_hour: Resources) -> Self {
        if let Some(territory) = self.state.territory_mut(name) {
            territory.generation = GenerationState::new(PerHour(per_hour));
        }
        self
    }

    /// Set base storage capacity (bonus multipliers apply on top).
    pub fn with_storage_capacity(mut self, name: &str, capacity: Resources) -> Self {
        if let Some(territory) = self.state.territory_mut(name) {
            territory.storage.base = capacity;
            territory.storage.capacity = capacity;
        }
        self
    }

    pub fn build(self) -> WorldState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceKind;

    #[test]
    fn test_builder_wires_ownership_and_links() {
        let state = WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_territory("A", "ALF")
            .with_territory("B", NONE_TAG)
            .with_hq("A")
            .with_link("A", "B")
            .with_generation("B", Resources::only(ResourceKind::Fish, 100.0))
            .build();

        let a = state.territory("A").unwrap();
        assert_eq!(a.guild.tag, "ALF");
        assert_eq!(a.guild.name, "Alpha");
        assert!(a.options.is_hq);
        assert!(a.links.direct.contains("B"));

        let b = state.territory("B").unwrap();
        assert!(b.guild.is_none());
        assert!(b.links.direct.contains("A"));
        assert_eq!(b.generation.base.0.fish, 100.0);
        assert_eq!(state.hq_of("ALF").unwrap().name, "A");
    }
}
