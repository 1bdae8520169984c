//! Open documents and on-demand object resolution
//!
//! [`PdfDocument::open`] reads the header, the cross-reference chain (or
//! rebuilds it) and the encryption dictionary. Nothing else is parsed up
//! front: objects are loaded when a [`Value`] is navigated into them, go
//! through the object cache, and come back as Null when they cannot be read.

use crate::encryption::{EncryptionHandler, EncryptionParams, Permissions};
use crate::error::{ParseError, ParseResult};
use crate::filters::{FailingReader, FilterChain};
use crate::memory::{CacheStats, LruCache, ObjectCache};
use crate::objects::ObjectId;
use crate::parser::{
    ObjectLoader, ObjectStream, PdfArray, PdfDictionary, PdfHeader, PdfObject, PdfStream,
    PdfTrailer, PdfVersion, XRefEntry, XRefTable,
};
use crate::recovery::{RecoveryStats, XRefRecovery};
use crate::source::{ByteSource, FileSource};
use crate::value::Value;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Longest chain of objects whose body is just another reference
const MAX_REFERENCE_HOPS: usize = 32;

/// Decoded object streams kept per document
const OBJECT_STREAM_CACHE_SIZE: usize = 16;

/// Options for opening a document
#[derive(Clone)]
pub struct ReaderOptions {
    /// Maximum cached objects (0 = unbounded)
    pub cache_capacity: usize,
    /// Sources larger than this are not scanned by recovery
    pub max_recovery_bytes: u64,
    /// Maximum object streams followed through `Extends`
    pub max_extends_depth: usize,
    /// Accept an object whose header names a different identity than requested
    pub lenient_identity: bool,
    /// Tried after the empty password and before any password provider
    pub password: Option<String>,
    /// Rebuild the xref table when it cannot be parsed
    pub recover: bool,
    /// Use this cache instead of a private one
    pub shared_cache: Option<ObjectCache>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            max_recovery_bytes: 256 * 1024 * 1024,
            max_extends_depth: 32,
            lenient_identity: true,
            password: None,
            recover: true,
            shared_cache: None,
        }
    }
}

impl ReaderOptions {
    /// Set the object cache capacity; 0 disables the bound
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Skip recovery for sources larger than `bytes`
    pub fn with_max_recovery_bytes(mut self, bytes: u64) -> Self {
        self.max_recovery_bytes = bytes;
        self
    }

    /// Limit how many object streams an `Extends` chain may visit
    pub fn with_max_extends_depth(mut self, depth: usize) -> Self {
        self.max_extends_depth = depth;
        self
    }

    /// Accept objects whose header disagrees with their xref entry
    pub fn with_lenient_identity(mut self, lenient: bool) -> Self {
        self.lenient_identity = lenient;
        self
    }

    /// Password to try before asking any provider
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enable or disable xref reconstruction on damaged files
    pub fn with_recovery(mut self, recover: bool) -> Self {
        self.recover = recover;
        self
    }

    /// Share `cache` with other documents opened with the same cache
    pub fn with_shared_cache(mut self, cache: ObjectCache) -> Self {
        self.shared_cache = Some(cache);
        self
    }
}

impl std::fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("cache_capacity", &self.cache_capacity)
            .field("max_recovery_bytes", &self.max_recovery_bytes)
            .field("max_extends_depth", &self.max_extends_depth)
            .field("lenient_identity", &self.lenient_identity)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("recover", &self.recover)
            .field("shared_cache", &self.shared_cache.is_some())
            .finish()
    }
}

/// Supplies passwords for encrypted documents.
///
/// Called until a password authenticates or it returns an empty string.
pub trait PasswordProvider {
    fn next_password(&mut self) -> String;
}

impl<F: FnMut() -> String> PasswordProvider for F {
    fn next_password(&mut self) -> String {
        self()
    }
}

/// State shared by a document and every [`Value`] taken from it
pub(crate) struct DocumentInner {
    loader: ObjectLoader,
    xref: XRefTable,
    version: PdfVersion,
    encryption: Option<EncryptionHandler>,
    /// The encryption dictionary's own object is never decrypted
    encrypt_ref: Option<ObjectId>,
    cache: ObjectCache,
    namespace: u64,
    object_streams: Mutex<LruCache<u32, Arc<ObjectStream>>>,
    max_extends_depth: usize,
    lenient_identity: bool,
    closed: AtomicBool,
    recovery_stats: Option<RecoveryStats>,
}

impl DocumentInner {
    /// Resolve `id`, following reference chains. `None` means Null.
    pub(crate) fn resolve(&self, id: ObjectId) -> Option<(ObjectId, Arc<PdfObject>)> {
        let mut current = id;
        let mut seen = HashSet::new();
        for _ in 0..MAX_REFERENCE_HOPS {
            let object = self.resolve_one(current)?;
            match object.as_ref() {
                PdfObject::Reference(next) => {
                    if !seen.insert(current) {
                        break;
                    }
                    current = *next;
                }
                _ => return Some((current, object)),
            }
        }
        debug!("Reference chain from {id} does not end; treating as null");
        None
    }

    fn resolve_one(&self, id: ObjectId) -> Option<Arc<PdfObject>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        if let Some(hit) = self.cache.get(self.namespace, id) {
            return Some(hit);
        }
        // Parsed without holding the cache lock; a racing thread may parse it too
        match self.load(id) {
            Ok(object) => {
                let object = Arc::new(object);
                self.cache.put(self.namespace, id, object.clone());
                Some(object)
            }
            Err(e) => {
                debug!("Object {id} resolves to null: {e}");
                None
            }
        }
    }

    fn load(&self, id: ObjectId) -> ParseResult<PdfObject> {
        match self.xref.get(id.number()) {
            None | Some(XRefEntry::Free) => Err(ParseError::InvalidReference(id.number(), id.generation())),
            Some(XRefEntry::Direct { offset, generation }) => {
                if generation != id.generation() {
                    return Err(ParseError::InvalidReference(id.number(), id.generation()));
                }
                let (found, mut object) = self.loader.read_object_at(offset)?;
                if found != id {
                    warn!("Offset {offset} for object {id} holds object {found}");
                    if !self.lenient_identity {
                        return Err(ParseError::InvalidReference(id.number(), id.generation()));
                    }
                }
                if let Some(handler) = &self.encryption {
                    if self.encrypt_ref != Some(id) {
                        handler.decrypt_object(id, &mut object);
                    }
                }
                Ok(object)
            }
            Some(XRefEntry::InContainer { container, index }) => {
                if id.generation() != 0 {
                    return Err(ParseError::InvalidReference(id.number(), id.generation()));
                }
                self.load_from_container(id.number(), container, index)
            }
        }
    }

    /// Find object `number` in `container` or the containers it extends
    fn load_from_container(&self, number: u32, container: u32, index: u32) -> ParseResult<PdfObject> {
        let mut visited = HashSet::new();
        let mut next = Some(container);
        while let Some(current) = next {
            if visited.len() >= self.max_extends_depth || !visited.insert(current) {
                warn!("Extends chain from object stream {container} is cyclic or too long");
                return Err(ParseError::CircularReference);
            }
            let stream = self.object_stream(current)?;
            if let Some(found) = stream.get_object(number, index) {
                return found;
            }
            next = stream.extends().map(|id| id.number());
        }
        Err(ParseError::InvalidReference(number, 0))
    }

    fn object_stream(&self, number: u32) -> ParseResult<Arc<ObjectStream>> {
        if let Ok(mut streams) = self.object_streams.lock() {
            if let Some(stream) = streams.get(&number) {
                return Ok(stream.clone());
            }
        }

        // Containers must live at a direct offset
        let id = match self.xref.get(number) {
            Some(XRefEntry::Direct { generation, .. }) => ObjectId::new(number, generation),
            _ => {
                return Err(ParseError::syntax(
                    0,
                    format!("object stream {number} is not stored directly"),
                ))
            }
        };
        let object = self.load(id)?;
        let stream = object.as_stream().ok_or_else(|| {
            ParseError::syntax(0, format!("object {id} is a {}, not a stream", object.kind_name()))
        })?;

        let mut data = Vec::new();
        self.stream_reader(id, stream)
            .read_to_end(&mut data)
            .map_err(|e| ParseError::StreamDecodeError(format!("object stream {id}: {e}")))?;
        let parsed = Arc::new(ObjectStream::parse(&stream.dict, data)?);

        if let Ok(mut streams) = self.object_streams.lock() {
            streams.put(number, parsed.clone());
        }
        Ok(parsed)
    }

    /// Replace a reference by what it points at, one level deep
    fn shallow(&self, object: &PdfObject) -> PdfObject {
        match object {
            PdfObject::Reference(id) => self
                .resolve(*id)
                .map(|(_, o)| o.as_ref().clone())
                .unwrap_or_default(),
            PdfObject::Array(array) => PdfObject::Array(PdfArray(
                array
                    .0
                    .iter()
                    .map(|item| match item {
                        PdfObject::Reference(_) => self.shallow(item),
                        other => other.clone(),
                    })
                    .collect(),
            )),
            other => other.clone(),
        }
    }

    /// Decrypted, decoded bytes of the stream belonging to object `id`
    pub(crate) fn stream_reader(&self, id: ObjectId, stream: &PdfStream) -> Box<dyn Read + Send> {
        if self.closed.load(Ordering::Acquire) {
            return Box::new(FailingReader::new(ParseError::DocumentClosed));
        }

        let declared = stream
            .dict
            .get("Length")
            .map(|length| self.shallow(length))
            .and_then(|length| length.as_integer())
            .and_then(|length| u64::try_from(length).ok());
        let length = match self.loader.stream_length(stream, declared) {
            Ok(length) => length,
            Err(e) => return Box::new(FailingReader::new(e)),
        };

        let filter = stream.dict.get("Filter").map(|f| self.shallow(f));
        let parms = stream
            .dict
            .get("DecodeParms")
            .or_else(|| stream.dict.get("DP"))
            .map(|p| self.shallow(p));
        let chain = match FilterChain::from_objects(filter.as_ref(), parms.as_ref()) {
            Ok(chain) => chain,
            Err(e) => return Box::new(FailingReader::new(e)),
        };

        let raw: Box<dyn Read + Send> = Box::new(self.loader.stream_reader(stream, length));
        let decrypted = match &self.encryption {
            Some(handler) if self.stream_is_encrypted(handler, &stream.dict, &chain) => {
                handler.decrypt_reader(id, raw)
            }
            _ => raw,
        };
        chain.reader(decrypted)
    }

    fn stream_is_encrypted(
        &self,
        handler: &EncryptionHandler,
        dict: &PdfDictionary,
        chain: &FilterChain,
    ) -> bool {
        match dict.get_type() {
            Some("XRef") => return false,
            Some("Metadata") if !handler.encrypts_metadata() => return false,
            _ => {}
        }
        chain.crypt_filter() != Some("Identity")
    }

    pub(crate) fn trailer(&self) -> &PdfTrailer {
        self.xref.trailer()
    }
}

/// An open PDF document.
///
/// Cheap to clone; clones share the cache and the open source.
#[derive(Clone)]
pub struct PdfDocument {
    inner: Arc<DocumentInner>,
}

impl PdfDocument {
    /// Open a document with default options
    pub fn open<S: ByteSource + 'static>(source: S) -> ParseResult<Self> {
        Self::open_with_options(source, ReaderOptions::default())
    }

    /// Open a file from disk
    pub fn open_path<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::open(FileSource::open(path)?)
    }

    pub fn open_with_password<S: ByteSource + 'static>(source: S, password: &str) -> ParseResult<Self> {
        Self::open_with_options(source, ReaderOptions::default().with_password(password))
    }

    pub fn open_with_options<S: ByteSource + 'static>(source: S, options: ReaderOptions) -> ParseResult<Self> {
        Self::open_source(Arc::new(source), options, None)
    }

    /// Open, asking `provider` for passwords while none of them fits
    pub fn open_with_provider<S: ByteSource + 'static>(
        source: S,
        options: ReaderOptions,
        provider: &mut dyn PasswordProvider,
    ) -> ParseResult<Self> {
        Self::open_source(Arc::new(source), options, Some(provider))
    }

    fn open_source(
        source: Arc<dyn ByteSource>,
        options: ReaderOptions,
        provider: Option<&mut dyn PasswordProvider>,
    ) -> ParseResult<Self> {
        if source.is_empty() {
            return Err(ParseError::EmptyFile);
        }
        let header = PdfHeader::scan(source.as_ref())?;
        let loader = ObjectLoader::new(source);

        let (xref, recovery_stats) = Self::load_xref(&loader, &options)?;
        let encrypt_ref = xref.trailer().encrypt().and_then(PdfObject::as_reference);
        let encryption = match xref.trailer().encrypt() {
            Some(encrypt) => {
                let dict = Self::encryption_dict(&loader, &xref, encrypt)?;
                let file_id = xref.trailer().id().unwrap_or_default();
                let params = EncryptionParams::from_dict(&dict, file_id)?;
                Some(Self::authenticate(&params, &options, provider)?)
            }
            None => None,
        };

        let cache = match &options.shared_cache {
            Some(shared) => shared.clone(),
            None => ObjectCache::new(options.cache_capacity),
        };

        Ok(Self {
            inner: Arc::new(DocumentInner {
                loader,
                xref,
                version: header.version,
                encryption,
                encrypt_ref,
                cache,
                namespace: ObjectCache::new_namespace(),
                object_streams: Mutex::new(LruCache::new(OBJECT_STREAM_CACHE_SIZE)),
                max_extends_depth: options.max_extends_depth,
                lenient_identity: options.lenient_identity,
                closed: AtomicBool::new(false),
                recovery_stats,
            }),
        })
    }

    fn load_xref(
        loader: &ObjectLoader,
        options: &ReaderOptions,
    ) -> ParseResult<(XRefTable, Option<RecoveryStats>)> {
        let parsed = XRefTable::parse(loader).and_then(|table| {
            table.trailer().root()?;
            Ok(table)
        });
        let error = match parsed {
            Ok(table) => return Ok((table, None)),
            Err(e) if !options.recover => return Err(e),
            Err(e) => e,
        };

        warn!("Cross-reference data unusable ({error}); scanning file to rebuild it");
        match XRefRecovery::new(options.max_recovery_bytes).recover(loader) {
            Ok(recovered) => Ok((recovered.table, Some(recovered.stats))),
            Err(e @ ParseError::FileTooLarge { .. }) => Err(e),
            Err(e) => Err(ParseError::RecoveryFailed(format!("{error}; recovery: {e}"))),
        }
    }

    /// The encryption dictionary, read straight from the file and never decrypted
    fn encryption_dict(
        loader: &ObjectLoader,
        xref: &XRefTable,
        encrypt: &PdfObject,
    ) -> ParseResult<PdfDictionary> {
        let load = |object: &PdfObject| -> ParseResult<PdfObject> {
            let Some(id) = object.as_reference() else {
                return Ok(object.clone());
            };
            match xref.get(id.number()) {
                Some(XRefEntry::Direct { offset, .. }) => Ok(loader.read_object_at(offset)?.1),
                _ => Err(ParseError::EncryptionNotSupported(format!(
                    "encryption object {id} is not stored directly"
                ))),
            }
        };

        let mut dict = match load(encrypt)? {
            PdfObject::Dictionary(dict) => dict,
            other => {
                return Err(ParseError::EncryptionNotSupported(format!(
                    "/Encrypt is a {}",
                    other.kind_name()
                )))
            }
        };
        let indirect: Vec<(String, PdfObject)> = dict
            .iter()
            .filter(|(_, value)| value.as_reference().is_some())
            .map(|(key, value)| (key.as_str().to_string(), value.clone()))
            .collect();
        for (key, value) in indirect {
            dict.insert(key, load(&value)?);
        }
        Ok(dict)
    }

    fn authenticate(
        params: &EncryptionParams,
        options: &ReaderOptions,
        provider: Option<&mut dyn PasswordProvider>,
    ) -> ParseResult<EncryptionHandler> {
        let attempt = |password: &str| match EncryptionHandler::authenticate(params, password) {
            Err(ParseError::InvalidPassword) => Ok(None),
            other => other.map(Some),
        };

        if let Some(handler) = attempt("")? {
            return Ok(handler);
        }
        if let Some(password) = options.password.as_deref().filter(|p| !p.is_empty()) {
            if let Some(handler) = attempt(password)? {
                return Ok(handler);
            }
            debug!("Configured password was rejected");
        }
        if let Some(provider) = provider {
            loop {
                let password = provider.next_password();
                if password.is_empty() {
                    break;
                }
                if let Some(handler) = attempt(&password)? {
                    return Ok(handler);
                }
                debug!("Password from provider was rejected");
            }
        }
        Err(ParseError::InvalidPassword)
    }

    /// A Null value bound to this document
    #[cfg(feature = "async")]
    pub(crate) fn null(&self) -> Value {
        Value::new(self.inner.clone(), ObjectId::default(), Arc::new(PdfObject::Null))
    }

    /// The trailer dictionary of the newest revision
    pub fn trailer(&self) -> Value {
        Value::new(
            self.inner.clone(),
            ObjectId::default(),
            Arc::new(PdfObject::Dictionary(self.inner.trailer().dict.clone())),
        )
    }

    /// The document catalog
    pub fn root(&self) -> Value {
        self.trailer().key("Root")
    }

    /// The document information dictionary (Null when absent)
    pub fn info(&self) -> Value {
        self.trailer().key("Info")
    }

    /// First element of the trailer `/ID`
    pub fn id(&self) -> Option<&[u8]> {
        self.inner.trailer().id()
    }

    pub fn version(&self) -> PdfVersion {
        self.inner.version
    }

    pub fn is_encrypted(&self) -> bool {
        self.inner.encryption.is_some()
    }

    /// Access permissions; everything is allowed on unencrypted documents
    pub fn permissions(&self) -> Permissions {
        self.inner
            .encryption
            .as_ref()
            .map(EncryptionHandler::permissions)
            .unwrap_or_default()
    }

    /// Resolve an indirect object. Missing, free and unreadable objects are Null.
    pub fn resolve(&self, id: ObjectId) -> Value {
        Value::resolved(self.inner.clone(), id)
    }

    pub fn xref(&self) -> &XRefTable {
        &self.inner.xref
    }

    /// Set when the xref table had to be rebuilt by scanning the file
    pub fn recovery_stats(&self) -> Option<&RecoveryStats> {
        self.inner.recovery_stats.as_ref()
    }

    pub fn cache_capacity(&self) -> usize {
        self.inner.cache.capacity()
    }

    /// Change the cache capacity; shrinking evicts right away
    pub fn set_cache_capacity(&self, capacity: usize) {
        self.inner.cache.set_capacity(capacity);
    }

    /// Drop this document's cached objects
    pub fn clear_cache(&self) {
        self.inner.cache.clear_namespace(self.inner.namespace);
        if let Ok(mut streams) = self.inner.object_streams.lock() {
            streams.clear();
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// The cache this document resolves through
    pub fn cache(&self) -> &ObjectCache {
        &self.inner.cache
    }

    /// Stop resolving. Values already taken stay readable as far as they
    /// need no further resolution; everything else becomes Null.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.clear_cache();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.inner.version)
            .field("objects", &self.inner.xref.len())
            .field("encrypted", &self.is_encrypted())
            .field("closed", &self.is_closed())
            .finish()
    }
}
