//! Containers, object handles and the registry tying them together

use bon::Builder;
use indexmap::IndexMap;
use std::{
    any::{type_name, Any},
    fmt,
    io::Cursor,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak},
};
use tracing::{debug, info, instrument, warn};
use uab_bundle::{BundleFile, BundleOpener, BundleOptions};
use uab_io::{CancellationToken, EndianReader, ResourceResolver, Tag};
use uab_serialized::{looks_like_serialized, ObjectInfo, SerializedFile};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    class_id::ClassId,
    decoder::{DecoderRegistry, GameVariant, Payload},
    error::{DecodeError, Error, Result},
    pptr::PPtr,
    reader::ObjectReader,
};

/// Options for an [`ObjectRegistry`]
#[derive(Debug, Clone, Builder)]
pub struct RegistryOptions {
    /// Title specific decoders and class id remapping to use
    #[builder(default)]
    pub game_variant: GameVariant,

    /// Keep every loaded file in memory; when off, objects are re-read through their
    /// tag on each decode
    #[builder(default = true)]
    pub keep_entry_bytes: bool,

    /// Options for bundles opened while loading
    #[builder(default)]
    pub bundle: BundleOptions,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        RegistryOptions::builder().build()
    }
}

/// Where the bytes of a container's objects are read from
enum ObjectSource {
    Memory(Arc<[u8]>),
    Tag(Tag),
}

/// One loaded serialized file and the handles of its objects
pub struct Container {
    name: String,
    tag: Option<Tag>,
    file: SerializedFile,
    source: ObjectSource,
    objects: RwLock<IndexMap<i64, Arc<ObjectHandle>>>,
    this: Weak<Container>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("objects", &self.len())
            .finish()
    }
}

impl Container {
    fn new(name: String, tag: Option<Tag>, file: SerializedFile, source: ObjectSource) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Container>| {
            let objects = file
                .objects
                .iter()
                .map(|info| (info.path_id, Arc::new(ObjectHandle::new(this.clone(), info.clone()))))
                .collect();
            Container {
                name,
                tag,
                file,
                source,
                objects: RwLock::new(objects),
                this: this.clone(),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tag the container was loaded from, if any
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    pub fn file(&self) -> &SerializedFile {
        &self.file
    }

    pub fn len(&self) -> usize {
        read_lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn object(&self, path_id: i64) -> Option<Arc<ObjectHandle>> {
        read_lock(&self.objects).get(&path_id).cloned()
    }

    /// Every handle, in object table order
    pub fn objects(&self) -> Vec<Arc<ObjectHandle>> {
        read_lock(&self.objects).values().cloned().collect()
    }

    /// The handle for `info`, creating an undecoded one if the identifier is new
    pub fn get_or_create(&self, info: &ObjectInfo) -> Arc<ObjectHandle> {
        if let Some(existing) = self.object(info.path_id) {
            return existing;
        }
        write_lock(&self.objects)
            .entry(info.path_id)
            .or_insert_with(|| Arc::new(ObjectHandle::new(self.this.clone(), info.clone())))
            .clone()
    }

    fn object_bytes(
        &self,
        info: &ObjectInfo,
        resolver: &ResourceResolver,
    ) -> std::result::Result<Vec<u8>, DecodeError> {
        let (start, size) = self.file.object_range(info);
        let endian = self.file.endian();
        match &self.source {
            ObjectSource::Memory(bytes) => {
                let mut reader = EndianReader::new(Cursor::new(&bytes[..]), endian)?;
                reader.seek_to(start)?;
                Ok(reader.read_bytes(size as usize)?)
            }
            ObjectSource::Tag(tag) => {
                let mut reader = EndianReader::new(resolver.open(tag)?, endian)?;
                reader.seek_to(start)?;
                Ok(reader.read_bytes(size as usize)?)
            }
        }
    }
}

#[derive(Clone)]
enum DecodeState {
    NotDecoded,
    Decoded(Payload),
    Failed(Arc<DecodeError>),
}

/// An object known to the registry
///
/// The identifier, class and size survive [`ObjectHandle::free`]; only the decoded
/// payload is dropped.
pub struct ObjectHandle {
    container: Weak<Container>,
    info: ObjectInfo,
    state: Mutex<DecodeState>,
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock_state() {
            DecodeState::NotDecoded => "not decoded",
            DecodeState::Decoded(_) => "decoded",
            DecodeState::Failed(_) => "failed",
        };
        f.debug_struct("ObjectHandle")
            .field("path_id", &self.info.path_id)
            .field("class_id", &self.class_id())
            .field("byte_size", &self.info.byte_size)
            .field("state", &state)
            .finish()
    }
}

impl ObjectHandle {
    fn new(container: Weak<Container>, info: ObjectInfo) -> Self {
        ObjectHandle {
            container,
            info,
            state: Mutex::new(DecodeState::NotDecoded),
        }
    }

    pub fn path_id(&self) -> i64 {
        self.info.path_id
    }

    /// Class id as stored in the file, before any game variant remapping
    pub fn class_id(&self) -> ClassId {
        ClassId(self.info.class_id)
    }

    pub fn byte_size(&self) -> u32 {
        self.info.byte_size
    }

    pub fn info(&self) -> &ObjectInfo {
        &self.info
    }

    pub fn container(&self) -> Option<Arc<Container>> {
        self.container.upgrade()
    }

    pub fn is_decoded(&self) -> bool {
        matches!(*self.lock_state(), DecodeState::Decoded(_))
    }

    /// The error of the last decode, kept until the handle is freed
    pub fn failure(&self) -> Option<Arc<DecodeError>> {
        match &*self.lock_state() {
            DecodeState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Drop the payload or failure so the next decode starts over
    pub fn free(&self) {
        *self.lock_state() = DecodeState::NotDecoded;
    }

    fn lock_state(&self) -> MutexGuard<'_, DecodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decode_error(&self, source: Arc<DecodeError>) -> Error {
        Error::Decode {
            path_id: self.path_id(),
            class_id: self.class_id(),
            source,
        }
    }
}

/// Outcome of [`ObjectRegistry::load_all`]
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<Arc<Container>>,
    /// A bundle entry that fails is listed under its entry tag next to the loaded siblings
    pub failed: Vec<(Tag, Error)>,
    /// Tags left unloaded because cancellation was requested
    pub skipped: Vec<Tag>,
}

impl LoadReport {
    pub fn cancelled(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Containers registered from one file and the bundle entries that failed to load
#[derive(Debug, Default)]
struct LoadOutcome {
    containers: Vec<Arc<Container>>,
    failed: Vec<(String, Error)>,
}

impl LoadOutcome {
    /// The containers, or the first entry failure when nothing loaded
    fn into_result(self) -> Result<Vec<Arc<Container>>> {
        match self.failed.into_iter().next() {
            Some((_, error)) if self.containers.is_empty() => Err(error),
            _ => Ok(self.containers),
        }
    }
}

/// Every loaded container, keyed by lower case file name, and the decoders for their objects
pub struct ObjectRegistry {
    options: RegistryOptions,
    decoders: DecoderRegistry,
    resolver: ResourceResolver,
    containers: RwLock<IndexMap<String, Arc<Container>>>,
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("options", &self.options)
            .field("decoders", &self.decoders)
            .field("containers", &read_lock(&self.containers).keys().collect::<Vec<_>>())
            .finish()
    }
}

fn container_key(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .to_lowercase()
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl ObjectRegistry {
    /// A registry resolving tags with a bundle aware resolver
    pub fn new(decoders: DecoderRegistry, options: RegistryOptions) -> Self {
        let resolver = ResourceResolver::default().with_opener(Arc::new(BundleOpener {
            options: options.bundle.clone(),
        }));
        ObjectRegistry {
            options,
            decoders,
            resolver,
            containers: RwLock::new(IndexMap::new()),
        }
    }

    pub fn with_resolver(mut self, resolver: ResourceResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    pub fn containers(&self) -> Vec<Arc<Container>> {
        read_lock(&self.containers).values().cloned().collect()
    }

    /// Find a container by file name, ignoring case and any directory part
    pub fn container(&self, name: &str) -> Option<Arc<Container>> {
        read_lock(&self.containers).get(&container_key(name)).cloned()
    }

    /// Register a parsed file whose bytes stay in memory
    pub fn add_container(&self, name: &str, file: SerializedFile, bytes: Vec<u8>) -> Arc<Container> {
        self.insert(name, None, file, ObjectSource::Memory(bytes.into()))
    }

    fn insert(
        &self,
        name: &str,
        tag: Option<Tag>,
        file: SerializedFile,
        source: ObjectSource,
    ) -> Arc<Container> {
        let key = container_key(name);
        let mut containers = write_lock(&self.containers);
        if let Some(existing) = containers.get(&key) {
            debug!(name, "container already loaded");
            return existing.clone();
        }
        let container = Container::new(name.to_string(), tag, file, source);
        info!(
            name,
            objects = container.len(),
            externals = container.file().externals.len(),
            "registered container"
        );
        containers.insert(key, container.clone());
        container
    }

    /// The handle for an object row of `container`, see [`Container::get_or_create`]
    pub fn get_or_create(&self, container: &Container, info: &ObjectInfo) -> Arc<ObjectHandle> {
        container.get_or_create(info)
    }

    /// Follow a pointer found in `from`
    ///
    /// Returns `None` for null pointers and for targets in files that are not loaded,
    /// so partially loaded collections stay usable.
    pub fn resolve_pointer<T>(&self, pointer: &PPtr<T>, from: &Container) -> Option<Arc<ObjectHandle>> {
        if pointer.is_null() {
            return None;
        }
        if pointer.file_index == 0 {
            return from.object(pointer.path_id);
        }

        let external = usize::try_from(pointer.file_index - 1)
            .ok()
            .and_then(|index| from.file().externals.get(index));
        let Some(external) = external else {
            warn!(
                container = from.name(),
                file_index = pointer.file_index,
                "pointer names an external file that is not in the table"
            );
            return None;
        };
        let Some(target) = self.container(external.file_name()) else {
            debug!(
                container = from.name(),
                external = external.path.as_str(),
                "pointer target file is not loaded"
            );
            return None;
        };
        target.object(pointer.path_id)
    }

    /// Decode an object once, returning the stored payload on later calls
    ///
    /// Concurrent calls for one handle are serialized on that handle; other handles
    /// decode in parallel. A failure is stored on the handle and returned again until
    /// [`ObjectHandle::free`] is called.
    #[instrument(skip_all, fields(path_id = handle.path_id(), class_id = %handle.class_id()), err)]
    pub fn decode(&self, handle: &ObjectHandle) -> Result<Payload> {
        let mut state = handle.lock_state();
        match &*state {
            DecodeState::Decoded(payload) => return Ok(payload.clone()),
            DecodeState::Failed(error) => return Err(handle.decode_error(error.clone())),
            DecodeState::NotDecoded => {}
        }

        let container = handle
            .container()
            .ok_or(Error::ContainerDropped(handle.path_id()))?;
        match self.run_decoder(&container, handle) {
            Ok(payload) => {
                debug!("decoded object");
                *state = DecodeState::Decoded(payload.clone());
                Ok(payload)
            }
            Err(error) => {
                let error = Arc::new(error);
                *state = DecodeState::Failed(error.clone());
                Err(handle.decode_error(error))
            }
        }
    }

    /// [`ObjectRegistry::decode`] and downcast the payload
    pub fn decode_as<T: Any + Send + Sync>(&self, handle: &ObjectHandle) -> Result<Arc<T>> {
        self.decode(handle)?
            .downcast::<T>()
            .map_err(|_| Error::PayloadType {
                path_id: handle.path_id(),
                expected: type_name::<T>(),
            })
    }

    fn run_decoder(
        &self,
        container: &Container,
        handle: &ObjectHandle,
    ) -> std::result::Result<Payload, DecodeError> {
        let variant = &self.options.game_variant;
        let class_id = self.decoders.effective_class(handle.class_id(), variant);
        let decoder = self
            .decoders
            .lookup(handle.class_id(), variant)
            .ok_or(DecodeError::NoDecoder(class_id))?;

        let bytes = container.object_bytes(handle.info(), &self.resolver)?;
        let file = container.file();
        let tree = file
            .type_of(handle.info())
            .and_then(|ty| ty.tree.as_ref())
            .filter(|tree| !tree.nodes.is_empty());
        let mut reader = ObjectReader::new(
            &bytes,
            file.endian(),
            handle.path_id(),
            class_id,
            file.version(),
            &file.unity_version,
            tree,
            variant,
        )?;
        decoder.decode(&mut reader)
    }

    /// Drop the payload of one object, see [`ObjectHandle::free`]
    pub fn free(&self, handle: &ObjectHandle) {
        handle.free();
    }

    /// Drop every decoded payload, keeping all metadata
    pub fn free_all(&self) {
        for container in self.containers() {
            for handle in container.objects() {
                handle.free();
            }
        }
    }

    /// Every object whose class, after remapping, is `class_id`
    pub fn objects_of_class(&self, class_id: ClassId) -> Vec<Arc<ObjectHandle>> {
        let variant = &self.options.game_variant;
        self.containers()
            .iter()
            .flat_map(|container| container.objects())
            .filter(|handle| self.decoders.effective_class(handle.class_id(), variant) == class_id)
            .collect()
    }

    /// Load the serialized file or bundle behind `tag`
    ///
    /// A bundle registers one container per serialized entry; other entries are skipped.
    /// An entry that fails to load is logged and does not stop its siblings; the call
    /// fails only when no entry could be registered.
    #[instrument(skip(self, tag), fields(tag = %tag), err)]
    pub fn load(&self, tag: &Tag) -> Result<Vec<Arc<Container>>> {
        self.load_tag(tag)?.into_result()
    }

    /// Load a serialized file or bundle held in memory
    pub fn load_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<Arc<Container>>> {
        self.load_from(name, bytes, None)?.into_result()
    }

    fn load_tag(&self, tag: &Tag) -> Result<LoadOutcome> {
        let bytes = self.resolver.read_all(tag)?;
        self.load_from(&tag.leaf_name(), bytes, Some(tag))
    }

    fn load_from(&self, name: &str, bytes: Vec<u8>, tag: Option<&Tag>) -> Result<LoadOutcome> {
        if looks_like_serialized(&bytes) {
            return Ok(LoadOutcome {
                containers: vec![self.load_serialized(name, bytes, tag.cloned())?],
                failed: Vec::new(),
            });
        }

        let mut bundle = BundleFile::with_options(Cursor::new(bytes), self.options.bundle.clone())?;
        let mut outcome = LoadOutcome::default();
        for index in 0..bundle.len() {
            let entry_name = bundle.blocks()[index].path.clone();
            let loaded = bundle.read_entry(index).map_err(Error::from).and_then(|entry| {
                if !looks_like_serialized(&entry) {
                    warn!(bundle = name, entry = entry_name.as_str(), "skipping entry that is not a serialized file");
                    return Ok(None);
                }
                let entry_tag = tag.map(|tag| tag.entry(entry_name.clone()));
                self.load_serialized(&entry_name, entry, entry_tag).map(Some)
            });
            match loaded {
                Ok(Some(container)) => outcome.containers.push(container),
                Ok(None) => {}
                Err(error) => {
                    warn!(bundle = name, entry = entry_name.as_str(), %error, "skipping entry that failed to load");
                    outcome.failed.push((entry_name, error));
                }
            }
        }
        bundle.clear_cache();
        Ok(outcome)
    }

    fn load_serialized(&self, name: &str, bytes: Vec<u8>, tag: Option<Tag>) -> Result<Arc<Container>> {
        let file = SerializedFile::from_bytes(&bytes)?;
        let source = match &tag {
            Some(tag) if !self.options.keep_entry_bytes => ObjectSource::Tag(tag.clone()),
            _ => ObjectSource::Memory(bytes.into()),
        };
        Ok(self.insert(name, tag, file, source))
    }

    /// Load many tags, checking `cancel` before each one
    ///
    /// A failing tag is reported and does not stop the others. With the `parallel`
    /// feature tags are loaded on the rayon pool.
    #[instrument(skip_all, fields(tags = tags.len()))]
    pub fn load_all(&self, tags: &[Tag], cancel: &CancellationToken) -> LoadReport {
        let load = |tag: &Tag| {
            if cancel.is_cancelled() {
                return (tag.clone(), None);
            }
            (tag.clone(), Some(self.load_tag(tag)))
        };

        #[cfg(feature = "parallel")]
        let results: Vec<_> = tags.par_iter().map(load).collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<_> = tags.iter().map(load).collect();

        let mut report = LoadReport::default();
        for (tag, result) in results {
            match result {
                Some(Ok(outcome)) => {
                    report.loaded.extend(outcome.containers);
                    report.failed.extend(
                        outcome
                            .failed
                            .into_iter()
                            .map(|(entry, error)| (tag.entry(entry), error)),
                    );
                }
                Some(Err(error)) => {
                    warn!(tag = %tag, %error, "failed to load");
                    report.failed.push((tag, error));
                }
                None => report.skipped.push(tag),
            }
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "bulk load finished"
        );
        report
    }
}
