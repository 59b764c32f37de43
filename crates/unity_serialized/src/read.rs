use binrw::BinRead;
use indexmap::IndexMap;
use std::io::{Cursor, Read};
use tracing::{debug, instrument, trace};
use unity_version::EngineVersion;

use crate::error::{Error, Result};
use crate::stream::EndianReader;
use crate::typetree::{blob, legacy, CommonStrings, TypeTree};
use crate::types::{
    endian_from_byte, ExternalFileReference, HeaderPrefix, LargeHeader, ObjectInfo, ParseOptions,
    ReferenceTypeName, ScriptIdentifier, SerializedHeader, SerializedType, HEADER_ENDIAN_VERSION,
    LARGE_FILES_VERSION, MAX_FORMAT_VERSION, MIN_FORMAT_VERSION, MONO_BEHAVIOUR_CLASS_ID,
};

/// A parsed serialized file
///
/// The file owns its bytes, object data is sliced out of them on demand.
#[derive(Debug, Clone)]
pub struct SerializedFile {
    pub(crate) name: String,
    pub(crate) header: SerializedHeader,
    pub(crate) engine_version_text: String,
    pub(crate) engine_version: EngineVersion,
    pub(crate) target_platform: i32,
    pub(crate) has_type_trees: bool,
    pub(crate) types: Vec<SerializedType>,
    pub(crate) big_id_enabled: i32,
    pub(crate) objects: IndexMap<i64, ObjectInfo>,
    pub(crate) script_types: Vec<ScriptIdentifier>,
    pub(crate) externals: Vec<ExternalFileReference>,
    pub(crate) reference_types: Vec<SerializedType>,
    pub(crate) user_information: String,
    pub(crate) metadata_end: usize,
    pub(crate) common_strings: Option<CommonStrings>,
    pub(crate) data: Vec<u8>,
}

/// Reject counts that can not fit in the remaining metadata before allocating for them
fn checked_count(reader: &mut EndianReader, element_size: usize, what: &str) -> Result<usize> {
    let count = reader.read_i32()?;
    usize::try_from(count)
        .ok()
        .filter(|count| count.saturating_mul(element_size) <= reader.remaining())
        .ok_or_else(|| {
            Error::CorruptStructure(format!(
                "{what} count {count} does not fit in {} bytes",
                reader.remaining()
            ))
        })
}

fn read_serialized_type(
    reader: &mut EndianReader,
    format_version: u32,
    has_type_trees: bool,
    is_reference_type: bool,
    common: &CommonStrings,
) -> Result<SerializedType> {
    let mut ty = SerializedType {
        class_id: reader.read_i32()?,
        ..Default::default()
    };
    if format_version >= 16 {
        ty.is_stripped = reader.read_bool()?;
    }
    if format_version >= 17 {
        ty.script_type_index = reader.read_i16()?;
    }
    if format_version >= 13 {
        if has_script_id(&ty, format_version, is_reference_type) {
            ty.script_id = Some(reader.read_array()?);
        }
        ty.old_type_hash = Some(reader.read_array()?);
    }

    if has_type_trees {
        ty.type_tree = Some(if uses_blob_type_tree(format_version) {
            blob::read(reader, format_version, common)?
        } else {
            TypeTree::new(legacy::read(reader, format_version)?)
        });

        if format_version >= 21 {
            if is_reference_type {
                ty.reference = Some(ReferenceTypeName {
                    class_name: reader.read_cstring_lossy()?,
                    namespace: reader.read_cstring_lossy()?,
                    assembly: reader.read_cstring_lossy()?,
                });
            } else {
                let count = checked_count(reader, 4, "type dependency")?;
                ty.type_dependencies = (0..count)
                    .map(|_| reader.read_i32())
                    .collect::<core::result::Result<_, _>>()?;
            }
        }
    }

    trace!(class_id = ty.class_id, reference = is_reference_type, "serialized type");
    Ok(ty)
}

/// Whether the type stores a script hash
pub(crate) fn has_script_id(ty: &SerializedType, format_version: u32, is_reference_type: bool) -> bool {
    (is_reference_type && ty.script_type_index >= 0)
        || (format_version < 16 && ty.class_id < 0)
        || (format_version >= 16 && ty.class_id == MONO_BEHAVIOUR_CLASS_ID)
}

/// Whether the revision stores TypeTrees in the blob encoding
pub(crate) fn uses_blob_type_tree(format_version: u32) -> bool {
    format_version >= 12 || format_version == 10
}

fn read_object(
    reader: &mut EndianReader,
    format_version: u32,
    big_id_enabled: bool,
    data_offset: u64,
    types: &[SerializedType],
) -> Result<ObjectInfo> {
    let path_id = if big_id_enabled {
        reader.read_i64()?
    } else if format_version < 14 {
        reader.read_i32()? as i64
    } else {
        reader.align(4);
        reader.read_i64()?
    };

    let byte_start = if format_version >= LARGE_FILES_VERSION {
        reader.read_i64()?
    } else {
        reader.read_u32()? as i64
    };
    let byte_start = u64::try_from(byte_start)
        .ok()
        .and_then(|start| start.checked_add(data_offset))
        .ok_or_else(|| {
            Error::CorruptStructure(format!("object {path_id} starts at {byte_start}"))
        })?;
    let byte_size = reader.read_u32()?;
    let type_id = reader.read_i32()?;

    let (class_id, type_index) = if format_version < 16 {
        let class_id = reader.read_u16()? as i32;
        let type_index = types.iter().position(|ty| ty.class_id == type_id);
        (class_id, type_index)
    } else {
        let index = usize::try_from(type_id)
            .ok()
            .filter(|index| *index < types.len())
            .ok_or_else(|| {
                Error::CorruptStructure(format!(
                    "object {path_id} names type {type_id} of {}",
                    types.len()
                ))
            })?;
        (types[index].class_id, Some(index))
    };

    let mut info = ObjectInfo {
        path_id,
        byte_start,
        byte_size,
        type_id,
        class_id,
        type_index,
        is_destroyed: None,
        script_type_index: None,
        stripped: None,
    };
    if format_version < 11 {
        info.is_destroyed = Some(reader.read_u16()?);
    }
    if (11..17).contains(&format_version) {
        info.script_type_index = Some(reader.read_i16()?);
    }
    if format_version == 15 || format_version == 16 {
        info.stripped = Some(reader.read_u8()?);
    }

    Ok(info)
}

fn read_external(reader: &mut EndianReader, format_version: u32) -> Result<ExternalFileReference> {
    let mut external = ExternalFileReference::default();
    if format_version >= 6 {
        external.asset_path = reader.read_cstring_lossy()?;
    }
    if format_version >= 5 {
        external.guid = reader.read_array()?;
        external.kind = reader.read_i32()?;
    }
    external.path_name = reader.read_cstring_lossy()?;
    Ok(external)
}

/// Read the header, returning it with the metadata range
fn read_header(data: &[u8]) -> Result<(SerializedHeader, usize, usize)> {
    let mut reader = Cursor::new(data);
    let prefix = HeaderPrefix::read(&mut reader).map_err(|_| {
        Error::CorruptStructure(format!("{} bytes are too short for a header", data.len()))
    })?;

    let format_version = prefix.format_version;
    if !(MIN_FORMAT_VERSION..=MAX_FORMAT_VERSION).contains(&format_version) {
        return Err(Error::UnsupportedVersion(format_version));
    }

    let mut header = SerializedHeader {
        prefix,
        format_version,
        metadata_size: prefix.metadata_size as u64,
        file_size: prefix.file_size as u64,
        data_offset: prefix.data_offset as u64,
        endian: binrw::Endian::Big,
        reserved: [0; 3],
        large: None,
    };

    let (start, end) = if format_version >= HEADER_ENDIAN_VERSION {
        let mut endian = [0u8; 4];
        reader.read_exact(&mut endian).map_err(|_| {
            Error::CorruptStructure("header ends before the endian byte".into())
        })?;
        header.endian = endian_from_byte(endian[0]);
        header.reserved = [endian[1], endian[2], endian[3]];

        if format_version >= LARGE_FILES_VERSION {
            let large = LargeHeader::read(&mut reader).map_err(|_| {
                Error::CorruptStructure("header ends before the 64 bit fields".into())
            })?;
            header.metadata_size = large.metadata_size as u64;
            header.file_size = u64::try_from(large.file_size).map_err(|_| {
                Error::CorruptStructure(format!("negative file size {}", large.file_size))
            })?;
            header.data_offset = u64::try_from(large.data_offset).map_err(|_| {
                Error::CorruptStructure(format!("negative data offset {}", large.data_offset))
            })?;
            header.large = Some(large);
        }

        let start = header.size();
        (start, start.saturating_add(header.metadata_size as usize))
    } else {
        // The byte order and the metadata sit at the end of the file
        let start = header
            .file_size
            .checked_sub(header.metadata_size)
            .filter(|start| *start >= header.size() as u64)
            .ok_or_else(|| {
                Error::CorruptStructure(format!(
                    "metadata of {} bytes does not fit in a file of {}",
                    header.metadata_size, header.file_size
                ))
            })? as usize;
        let endian = *data.get(start).ok_or_else(|| {
            Error::CorruptStructure(format!("endian byte at {start} is past the data"))
        })?;
        header.endian = endian_from_byte(endian);
        (start + 1, header.file_size as usize)
    };

    if end > data.len() {
        return Err(Error::CorruptStructure(format!(
            "metadata ends at {end} past {} bytes",
            data.len()
        )));
    }

    Ok((header, start, end))
}

impl SerializedFile {
    /// Read a serialized file collecting the objects it contains.
    pub fn new(mut reader: impl Read) -> Result<SerializedFile> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    /// Parse a serialized file held in memory
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<SerializedFile> {
        Self::parse_with(data, &ParseOptions::default())
    }

    /// Parse a serialized file held in memory with explicit options
    #[instrument(skip_all, err)]
    pub fn parse_with(data: impl Into<Vec<u8>>, options: &ParseOptions) -> Result<SerializedFile> {
        let data = data.into();
        let (header, start, end) = read_header(&data)?;
        let format_version = header.format_version;
        debug!(
            format_version,
            endian = ?header.endian,
            metadata_size = header.metadata_size,
            data_offset = header.data_offset,
            "read serialized file header"
        );

        let mut reader = EndianReader::new(&data[..end], header.endian);
        reader.set_position(start);

        let engine_version_text = if format_version >= 7 {
            reader.read_cstring_lossy()?
        } else {
            String::new()
        };
        let engine_version = EngineVersion::parse(&engine_version_text).unwrap_or_else(|_| {
            debug!(engine = %engine_version_text, "unparsable engine version, assuming stripped");
            EngineVersion::default()
        });
        let target_platform = if format_version >= 8 {
            reader.read_i32()?
        } else {
            0
        };
        let has_type_trees = if format_version >= 13 {
            reader.read_bool()?
        } else {
            true
        };

        let common = options.common_strings();
        let count = checked_count(&mut reader, 4, "type")?;
        let types = (0..count)
            .map(|_| read_serialized_type(&mut reader, format_version, has_type_trees, false, common))
            .collect::<Result<Vec<_>>>()?;

        let big_id_enabled = if (7..14).contains(&format_version) {
            reader.read_i32()?
        } else {
            0
        };

        let count = checked_count(&mut reader, 12, "object")?;
        let mut objects = IndexMap::with_capacity(count);
        for _ in 0..count {
            let info = read_object(
                &mut reader,
                format_version,
                big_id_enabled != 0,
                header.data_offset,
                &types,
            )?;
            trace!(path_id = info.path_id, class_id = info.class_id, size = info.byte_size, "object");
            if let Some(previous) = objects.insert(info.path_id, info) {
                return Err(Error::CorruptStructure(format!(
                    "duplicate path id {}",
                    previous.path_id
                )));
            }
        }

        let mut script_types = Vec::new();
        if format_version >= 11 {
            let count = checked_count(&mut reader, 8, "script type")?;
            for _ in 0..count {
                let file_index = reader.read_i32()?;
                let path_id = if format_version < 14 {
                    reader.read_i32()? as i64
                } else {
                    reader.align(4);
                    reader.read_i64()?
                };
                script_types.push(ScriptIdentifier {
                    file_index,
                    path_id,
                });
            }
        }

        let count = checked_count(&mut reader, 1, "external")?;
        let externals = (0..count)
            .map(|_| read_external(&mut reader, format_version))
            .collect::<Result<Vec<_>>>()?;

        let mut reference_types = Vec::new();
        if format_version >= 20 {
            let count = checked_count(&mut reader, 4, "reference type")?;
            for _ in 0..count {
                reference_types.push(read_serialized_type(
                    &mut reader,
                    format_version,
                    has_type_trees,
                    true,
                    common,
                )?);
            }
        }

        let user_information = if format_version >= 5 {
            reader.read_cstring_lossy()?
        } else {
            String::new()
        };

        let metadata_end = reader.position();
        debug!(
            engine = %engine_version,
            types = types.len(),
            objects = objects.len(),
            externals = externals.len(),
            "read serialized file"
        );

        Ok(SerializedFile {
            name: options.name.clone().unwrap_or_default(),
            metadata_end,
            common_strings: options.common_strings.cloned(),
            header,
            engine_version_text,
            engine_version,
            target_platform,
            has_type_trees,
            types,
            big_id_enabled,
            objects,
            script_types,
            externals,
            reference_types,
            user_information,
            data,
        })
    }

    /// Name the file was opened under, empty when none was given
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed header
    pub fn header(&self) -> &SerializedHeader {
        &self.header
    }

    /// Format revision
    pub fn format_version(&self) -> u32 {
        self.header.format_version
    }

    /// Byte order of the metadata and of every object
    pub fn endian(&self) -> binrw::Endian {
        self.header.endian
    }

    /// Engine version as stored
    pub fn engine_version_text(&self) -> &str {
        &self.engine_version_text
    }

    /// Parsed engine version, all zeros when stripped
    pub fn engine_version(&self) -> EngineVersion {
        self.engine_version
    }

    /// Build target
    pub fn target_platform(&self) -> i32 {
        self.target_platform
    }

    /// Whether the types carry embedded TypeTrees
    pub fn has_type_trees(&self) -> bool {
        self.has_type_trees
    }

    /// Types of the objects in the file
    pub fn types(&self) -> &[SerializedType] {
        &self.types
    }

    /// Managed reference types, format 20 onwards
    pub fn reference_types(&self) -> &[SerializedType] {
        &self.reference_types
    }

    /// Script types, format 11 onwards
    pub fn script_types(&self) -> &[ScriptIdentifier] {
        &self.script_types
    }

    /// Files referenced by pointers, addressed from 1
    pub fn externals(&self) -> &[ExternalFileReference] {
        &self.externals
    }

    /// The external reference a pointer file index names
    pub fn external(&self, file_index: i32) -> Result<&ExternalFileReference> {
        usize::try_from(file_index)
            .ok()
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| self.externals.get(index))
            .ok_or(Error::CorruptReference {
                file_index,
                externals: self.externals.len(),
            })
    }

    /// Free text stored after the metadata
    pub fn user_information(&self) -> &str {
        &self.user_information
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the file holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in directory order
    pub fn objects(&self) -> impl Iterator<Item = &ObjectInfo> {
        self.objects.values()
    }

    /// Look up an object by path id
    pub fn object(&self, path_id: i64) -> Option<&ObjectInfo> {
        self.objects.get(&path_id)
    }

    /// The type entry describing an object
    pub fn object_type(&self, info: &ObjectInfo) -> Option<&SerializedType> {
        info.type_index.and_then(|index| self.types.get(index))
    }

    /// The bytes of an object
    pub fn object_data(&self, info: &ObjectInfo) -> Result<&[u8]> {
        usize::try_from(info.byte_start)
            .ok()
            .and_then(|start| Some(start..start.checked_add(info.byte_size as usize)?))
            .and_then(|range| self.data.get(range))
            .ok_or_else(|| {
                Error::CorruptStructure(format!(
                    "object {} at {} with {} bytes exceeds {} bytes",
                    info.path_id,
                    info.byte_start,
                    info.byte_size,
                    self.data.len()
                ))
            })
    }

    /// The whole file
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Common string table the blob TypeTrees were read with
    pub fn common_strings(&self) -> &CommonStrings {
        self.common_strings
            .as_ref()
            .unwrap_or_else(|| CommonStrings::builtin())
    }
}
