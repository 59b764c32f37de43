//! Decoding the objects of a serialized file

use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use unity_version::EngineVersion;

use crate::codec::{read_value, write_value};
use crate::error::{Error, Result};
use crate::read::SerializedFile;
use crate::stream::{EndianReader, EndianWriter};
use crate::typetree::TypeTreeNode;
use crate::types::ObjectInfo;
use crate::value::Value;

/// Supplies schemas for files that do not embed their TypeTrees
pub trait SchemaSource {
    /// The schema of a class as of an engine version
    fn schema(&self, class_id: i32, version: &EngineVersion) -> Result<Arc<TypeTreeNode>>;
}

/// How decode failures affect later objects
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Surface every error
    #[default]
    Strict,
    /// After the first underrun, hand out raw bytes for every later object
    DisableOnUnderrun,
}

/// Result of decoding one object
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedObject {
    /// The object decoded against its schema
    Value(Value),
    /// The object bytes, once decoding has been disabled
    Raw(Vec<u8>),
}

impl DecodedObject {
    /// The decoded value, if decoding ran
    pub fn value(&self) -> Option<&Value> {
        match self {
            DecodedObject::Value(value) => Some(value),
            DecodedObject::Raw(_) => None,
        }
    }
}

enum Schema<'a> {
    Embedded(&'a TypeTreeNode),
    Shared(Arc<TypeTreeNode>),
}

impl Deref for Schema<'_> {
    type Target = TypeTreeNode;

    fn deref(&self) -> &TypeTreeNode {
        match self {
            Schema::Embedded(node) => node,
            Schema::Shared(node) => node,
        }
    }
}

/// Decodes the objects of one file
pub struct ObjectDecoder<'a> {
    file: &'a SerializedFile,
    source: Option<&'a dyn SchemaSource>,
    policy: DecodePolicy,
    disabled: bool,
}

impl<'a> ObjectDecoder<'a> {
    /// Decoder using only the TypeTrees embedded in the file
    pub fn new(file: &'a SerializedFile) -> Self {
        Self {
            file,
            source: None,
            policy: DecodePolicy::default(),
            disabled: false,
        }
    }

    /// Fall back to a schema source for types without an embedded TypeTree
    pub fn with_source(mut self, source: &'a dyn SchemaSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Choose how failures affect later objects
    pub fn with_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether a previous underrun turned decoding off
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn schema(&self, info: &ObjectInfo) -> Result<Schema<'a>> {
        let file: &'a SerializedFile = self.file;
        let embedded = file
            .object_type(info)
            .and_then(|ty| ty.type_tree.as_ref())
            .map(|tree| &tree.root);
        if let Some(root) = embedded {
            return Ok(Schema::Embedded(root));
        }

        match self.source {
            Some(source) => Ok(Schema::Shared(
                source.schema(info.class_id, &file.engine_version())?,
            )),
            None => Err(Error::MissingSchema(info.class_id)),
        }
    }

    /// Decode the object described by `info`
    #[instrument(skip_all, fields(path_id = info.path_id, class_id = info.class_id), err)]
    pub fn decode(&mut self, info: &ObjectInfo) -> Result<DecodedObject> {
        let data = self.file.object_data(info)?;
        if self.disabled {
            return Ok(DecodedObject::Raw(data.to_vec()));
        }

        let schema = self.schema(info)?;
        let mut reader = EndianReader::new(data, self.file.endian());
        match read_value(&schema, &mut reader) {
            Ok(value) => {
                if reader.remaining() != 0 {
                    debug!(unread = reader.remaining(), "object has trailing bytes");
                }
                Ok(DecodedObject::Value(value))
            }
            Err(e @ Error::DecodeUnderrun { .. }) if self.policy == DecodePolicy::DisableOnUnderrun => {
                warn!(error = %e, "schema does not match the data, returning raw bytes from now on");
                self.disabled = true;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Decode an object by path id
    pub fn decode_path_id(&mut self, path_id: i64) -> Result<DecodedObject> {
        let file = self.file;
        let info = file.object(path_id).ok_or_else(|| Error::DanglingReference {
            file: file.name().to_owned(),
            path_id,
        })?;
        self.decode(info)
    }

    /// Encode a value with the schema of the object described by `info`
    #[instrument(skip_all, fields(path_id = info.path_id, class_id = info.class_id), err)]
    pub fn encode(&self, info: &ObjectInfo, value: &Value) -> Result<Vec<u8>> {
        let schema = self.schema(info)?;
        let mut writer = EndianWriter::new(self.file.endian());
        write_value(value, &schema, &mut writer)?;
        Ok(writer.into_inner())
    }
}
