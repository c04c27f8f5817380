//! Decoders for object payloads, chosen by class id and game variant

use std::{any::Any, collections::HashMap, fmt, str::FromStr, sync::Arc};
use tracing::trace;

use crate::{class_id::ClassId, error::DecodeError, reader::ObjectReader};

/// A decoded object, downcast by the caller to the decoder's output type
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Selects per title class id mappings and decoders
///
/// [`GameVariant::Standard`] decoders are used for every variant that does not
/// register its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum GameVariant {
    #[default]
    Standard,
    Named(String),
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameVariant::Standard => write!(f, "standard"),
            GameVariant::Named(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for GameVariant {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "" | "standard" => GameVariant::Standard,
            name => GameVariant::Named(name.to_string()),
        })
    }
}

/// Turns the bytes of one object into a payload
pub trait ObjectDecoder: Send + Sync {
    fn decode(&self, reader: &mut ObjectReader<'_>) -> Result<Payload, DecodeError>;
}

impl<F> ObjectDecoder for F
where
    F: Fn(&mut ObjectReader<'_>) -> Result<Payload, DecodeError> + Send + Sync,
{
    fn decode(&self, reader: &mut ObjectReader<'_>) -> Result<Payload, DecodeError> {
        self(reader)
    }
}

/// Explicit table of decoders, built once and handed to the object registry
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<(ClassId, GameVariant), Arc<dyn ObjectDecoder>>,
    remaps: HashMap<(GameVariant, ClassId), ClassId>,
    fallback: Option<Arc<dyn ObjectDecoder>>,
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .field("remaps", &self.remaps)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl DecoderRegistry {
    pub fn new() -> Self {
        DecoderRegistry::default()
    }

    /// Register `decoder` for a class; a later registration for the same pair replaces it
    pub fn register(
        &mut self,
        class_id: ClassId,
        variant: GameVariant,
        decoder: impl ObjectDecoder + 'static,
    ) -> &mut Self {
        self.decoders.insert((class_id, variant), Arc::new(decoder));
        self
    }

    /// Treat `from` as `to` when loading files of `variant`
    pub fn remap(&mut self, variant: GameVariant, from: ClassId, to: ClassId) -> &mut Self {
        self.remaps.insert((variant, from), to);
        self
    }

    /// Decoder used when nothing is registered for a class
    pub fn set_fallback(&mut self, decoder: impl ObjectDecoder + 'static) -> &mut Self {
        self.fallback = Some(Arc::new(decoder));
        self
    }

    /// The class id objects of `class_id` are decoded as under `variant`
    pub fn effective_class(&self, class_id: ClassId, variant: &GameVariant) -> ClassId {
        self.remaps
            .get(&(variant.clone(), class_id))
            .copied()
            .unwrap_or(class_id)
    }

    /// Find the decoder for a class: the variant's own, then the standard one, then the fallback
    pub fn lookup(&self, class_id: ClassId, variant: &GameVariant) -> Option<Arc<dyn ObjectDecoder>> {
        let class_id = self.effective_class(class_id, variant);
        let found = self
            .decoders
            .get(&(class_id, variant.clone()))
            .or_else(|| self.decoders.get(&(class_id, GameVariant::Standard)))
            .or(self.fallback.as_ref())
            .cloned();
        trace!(%class_id, %variant, found = found.is_some(), "decoder lookup");
        found
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{DecoderRegistry, GameVariant, Payload};
    use crate::{class_id::ClassId, error::DecodeError, reader::ObjectReader};

    fn constant(value: u32) -> impl Fn(&mut ObjectReader<'_>) -> Result<Payload, DecodeError> {
        move |_: &mut ObjectReader<'_>| Ok(Arc::new(value) as Payload)
    }

    fn decode_with(registry: &DecoderRegistry, class_id: ClassId, variant: &GameVariant) -> Option<u32> {
        let decoder = registry.lookup(class_id, variant)?;
        let standard = GameVariant::Standard;
        let mut reader = ObjectReader::new(
            &[],
            uab_io::Endian::Little,
            1,
            class_id,
            uab_serialized::SerializedVersion::LATEST,
            "",
            None,
            &standard,
        )
        .ok()?;
        let payload = decoder.decode(&mut reader).ok()?;
        payload.downcast::<u32>().ok().map(|value| *value)
    }

    #[test]
    fn variant_then_standard_then_fallback() {
        let custom = GameVariant::Named("custom".to_string());
        let mut registry = DecoderRegistry::new();
        registry
            .register(ClassId::TEXTURE_2D, GameVariant::Standard, constant(1))
            .register(ClassId::TEXTURE_2D, custom.clone(), constant(2))
            .register(ClassId::MESH, GameVariant::Standard, constant(3));

        assert_eq!(decode_with(&registry, ClassId::TEXTURE_2D, &GameVariant::Standard), Some(1));
        assert_eq!(decode_with(&registry, ClassId::TEXTURE_2D, &custom), Some(2));
        assert_eq!(decode_with(&registry, ClassId::MESH, &custom), Some(3));
        assert_eq!(decode_with(&registry, ClassId::SHADER, &custom), None);

        registry.set_fallback(constant(4));
        assert_eq!(decode_with(&registry, ClassId::SHADER, &custom), Some(4));
    }

    #[test]
    fn remapped_class_ids() {
        let custom = GameVariant::Named("custom".to_string());
        let mut registry = DecoderRegistry::new();
        registry
            .register(ClassId::MESH, GameVariant::Standard, constant(3))
            .remap(custom.clone(), ClassId(1001), ClassId::MESH);

        assert_eq!(registry.effective_class(ClassId(1001), &custom), ClassId::MESH);
        assert_eq!(registry.effective_class(ClassId(1001), &GameVariant::Standard), ClassId(1001));
        assert_eq!(decode_with(&registry, ClassId(1001), &custom), Some(3));
        assert_eq!(decode_with(&registry, ClassId(1001), &GameVariant::Standard), None);
    }
}
