//! This library keeps track of the objects in loaded serialized files, decodes them on
//! first access and follows pointers between them.
//!
//! # Model
//!
//! - A [`Container`] is one loaded serialized file. It owns an [`ObjectHandle`] per
//!   row of the object table.
//! - A handle keeps the identifier, class id and size of its object for as long as
//!   the container lives. The decoded payload is created by the first
//!   [`ObjectRegistry::decode`] and dropped again by [`ObjectHandle::free`].
//! - Decoders are looked up in a [`DecoderRegistry`] by class id and
//!   [`GameVariant`]. Each decoder gets an [`ObjectReader`] limited to the object's
//!   bytes. [`TypeTreeDecoder`] decodes any object of a file that carries type trees
//!   into a [`Value`].
//! - A [`PPtr`] is resolved through [`ObjectRegistry::resolve_pointer`]: file index
//!   zero is the pointer's own container, any other index goes through the external
//!   table to the container with that file name. Unloaded targets resolve to `None`.
//!
//! ```
//! use uab_registry::{ClassId, DecoderRegistry, ObjectRegistry, RegistryOptions, TypeTreeDecoder};
//!
//! let mut decoders = DecoderRegistry::new();
//! decoders.set_fallback(TypeTreeDecoder);
//! let registry = ObjectRegistry::new(decoders, RegistryOptions::default());
//! assert!(registry.objects_of_class(ClassId::TEXTURE_2D).is_empty());
//! ```
//!
//! # Features
//!
//! - `parallel`: [`ObjectRegistry::load_all`] loads on the rayon thread pool
//! - `serde`: [`Value`] and [`ClassId`] implement `Serialize`
//!

pub mod class_id;
pub mod decoder;
pub mod error;
pub mod pptr;
pub mod reader;
pub mod registry;
pub mod value;

pub use class_id::ClassId;
pub use decoder::{DecoderRegistry, GameVariant, ObjectDecoder, Payload};
pub use error::{DecodeError, Error, Result};
pub use pptr::PPtr;
pub use reader::ObjectReader;
pub use registry::{Container, LoadReport, ObjectHandle, ObjectRegistry, RegistryOptions};
pub use value::{read_value, TypeTreeDecoder, Value};
