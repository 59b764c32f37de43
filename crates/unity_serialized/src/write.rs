//! Serialized file writer
//!
//! Writing is the dual of parsing for format 9 onwards: an unmodified file comes back byte for
//! byte, including the padding between the metadata and the object data.

use binrw::BinWrite;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::read::{has_script_id, uses_blob_type_tree, SerializedFile};
use crate::stream::EndianWriter;
use crate::typetree::{blob, legacy, CommonStrings};
use crate::types::{
    endian_to_byte, HeaderPrefix, LargeHeader, SerializedType, HEADER_ENDIAN_VERSION,
    LARGE_FILES_VERSION,
};

/// Alignment of object data when the data section is rebuilt
const OBJECT_ALIGNMENT: usize = 8;

/// Alignment of the data section when its offset has to move
const DATA_ALIGNMENT: usize = 16;

/// Where an object lands in the written data section
struct Placement {
    relative_start: u64,
    byte_size: u32,
}

fn too_large(what: &str, value: impl std::fmt::Display) -> Error {
    Error::CorruptStructure(format!("{what} {value} does not fit the format"))
}

fn write_serialized_type(
    writer: &mut EndianWriter,
    ty: &SerializedType,
    format_version: u32,
    has_type_trees: bool,
    is_reference_type: bool,
    common: &CommonStrings,
) -> Result<()> {
    writer.write_i32(ty.class_id);
    if format_version >= 16 {
        writer.write_bool(ty.is_stripped);
    }
    if format_version >= 17 {
        writer.write_i16(ty.script_type_index);
    }
    if format_version >= 13 {
        if has_script_id(ty, format_version, is_reference_type) {
            writer.write_bytes(&ty.script_id.unwrap_or_default());
        }
        writer.write_bytes(&ty.old_type_hash.unwrap_or_default());
    }

    if has_type_trees {
        let tree = ty.type_tree.as_ref().ok_or_else(|| {
            Error::CorruptStructure(format!("type {} has no TypeTree", ty.class_id))
        })?;
        if uses_blob_type_tree(format_version) {
            blob::write(writer, tree, format_version, common);
        } else {
            legacy::write(writer, &tree.root, format_version);
        }

        if format_version >= 21 {
            if is_reference_type {
                let reference = ty.reference.clone().unwrap_or_default();
                writer.write_cstring(reference.class_name.as_bytes());
                writer.write_cstring(reference.namespace.as_bytes());
                writer.write_cstring(reference.assembly.as_bytes());
            } else {
                writer.write_i32(ty.type_dependencies.len() as i32);
                for dependency in &ty.type_dependencies {
                    writer.write_i32(*dependency);
                }
            }
        }
    }

    Ok(())
}

impl SerializedFile {
    /// Write the file back out
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with(&HashMap::new())
    }

    /// Write the file replacing the data of some objects, keyed by path id
    ///
    /// Without replacements the data section is copied verbatim. Otherwise it is rebuilt in
    /// directory order with every object aligned to 8 bytes.
    #[instrument(skip_all, fields(replacements = replacements.len()), err)]
    pub fn to_bytes_with(&self, replacements: &HashMap<i64, Vec<u8>>) -> Result<Vec<u8>> {
        let format_version = self.header.format_version;
        if format_version < HEADER_ENDIAN_VERSION {
            return Err(Error::UnsupportedVersion(format_version));
        }
        if let Some(path_id) = replacements.keys().find(|id| !self.objects.contains_key(*id)) {
            return Err(Error::DanglingReference {
                file: self.name.clone(),
                path_id: *path_id,
            });
        }

        let data_offset = self.header.data_offset as usize;
        let (data_section, placements) = if replacements.is_empty() {
            let section = self.data.get(data_offset..).ok_or_else(|| {
                Error::CorruptStructure(format!("data offset {data_offset} is past the file"))
            })?;
            let placements = self
                .objects
                .values()
                .map(|info| Placement {
                    relative_start: info.byte_start - self.header.data_offset,
                    byte_size: info.byte_size,
                })
                .collect::<Vec<_>>();
            (Cow::Borrowed(section), placements)
        } else {
            let mut section = Vec::new();
            let mut placements = Vec::with_capacity(self.objects.len());
            for info in self.objects.values() {
                section.resize(section.len().next_multiple_of(OBJECT_ALIGNMENT), 0);
                let bytes = match replacements.get(&info.path_id) {
                    Some(bytes) => bytes.as_slice(),
                    None => self.object_data(info)?,
                };
                placements.push(Placement {
                    relative_start: section.len() as u64,
                    byte_size: u32::try_from(bytes.len())
                        .map_err(|_| too_large("object size", bytes.len()))?,
                });
                section.extend_from_slice(bytes);
            }
            (Cow::Owned(section), placements)
        };

        let metadata = self.write_metadata(&placements)?;

        let header_size = self.header.size();
        let metadata_end = header_size + metadata.len();
        let (metadata_size, data_offset, padding) =
            if metadata_end == self.metadata_end && metadata_end <= data_offset {
                let padding = self.data.get(metadata_end..data_offset).ok_or_else(|| {
                    Error::CorruptStructure(format!("data offset {data_offset} is past the file"))
                })?;
                (self.header.metadata_size, data_offset, Cow::Borrowed(padding))
            } else {
                let offset = metadata_end.next_multiple_of(DATA_ALIGNMENT);
                (
                    metadata.len() as u64,
                    offset,
                    Cow::Owned(vec![0u8; offset - metadata_end]),
                )
            };
        let file_size = (data_offset + data_section.len()) as u64;

        let mut out = Cursor::new(Vec::with_capacity(file_size as usize));
        if format_version >= LARGE_FILES_VERSION {
            self.header.prefix.write(&mut out)?;
        } else {
            HeaderPrefix {
                metadata_size: u32::try_from(metadata_size)
                    .map_err(|_| too_large("metadata size", metadata_size))?,
                file_size: u32::try_from(file_size).map_err(|_| too_large("file size", file_size))?,
                format_version,
                data_offset: u32::try_from(data_offset)
                    .map_err(|_| too_large("data offset", data_offset))?,
            }
            .write(&mut out)?;
        }
        out.write_all(&[endian_to_byte(self.header.endian)])?;
        out.write_all(&self.header.reserved)?;
        if format_version >= LARGE_FILES_VERSION {
            LargeHeader {
                metadata_size: u32::try_from(metadata_size)
                    .map_err(|_| too_large("metadata size", metadata_size))?,
                file_size: file_size as i64,
                data_offset: data_offset as i64,
                reserved: self.header.large.map(|large| large.reserved).unwrap_or_default(),
            }
            .write(&mut out)?;
        }
        out.write_all(&metadata)?;
        out.write_all(&padding)?;
        out.write_all(&data_section)?;

        debug!(
            format_version,
            objects = placements.len(),
            size = file_size,
            "wrote serialized file"
        );
        Ok(out.into_inner())
    }

    fn write_metadata(&self, placements: &[Placement]) -> Result<Vec<u8>> {
        let format_version = self.header.format_version;
        let common = self.common_strings();
        let mut writer = EndianWriter::new(self.header.endian);

        if format_version >= 7 {
            writer.write_cstring(self.engine_version_text.as_bytes());
        }
        if format_version >= 8 {
            writer.write_i32(self.target_platform);
        }
        if format_version >= 13 {
            writer.write_bool(self.has_type_trees);
        }

        writer.write_i32(self.types.len() as i32);
        for ty in &self.types {
            write_serialized_type(
                &mut writer,
                ty,
                format_version,
                self.has_type_trees,
                false,
                common,
            )?;
        }

        if (7..14).contains(&format_version) {
            writer.write_i32(self.big_id_enabled);
        }

        // The metadata starts at a multiple of 4, so aligning the buffer aligns the file
        writer.write_i32(self.objects.len() as i32);
        for (info, placement) in self.objects.values().zip(placements) {
            if self.big_id_enabled != 0 {
                writer.write_i64(info.path_id);
            } else if format_version < 14 {
                writer.write_i32(info.path_id as i32);
            } else {
                writer.align(4);
                writer.write_i64(info.path_id);
            }
            if format_version >= LARGE_FILES_VERSION {
                writer.write_i64(placement.relative_start as i64);
            } else {
                writer.write_u32(
                    u32::try_from(placement.relative_start)
                        .map_err(|_| too_large("object offset", placement.relative_start))?,
                );
            }
            writer.write_u32(placement.byte_size);
            writer.write_i32(info.type_id);
            if format_version < 16 {
                writer.write_u16(info.class_id as u16);
            }
            if format_version < 11 {
                writer.write_u16(info.is_destroyed.unwrap_or_default());
            }
            if (11..17).contains(&format_version) {
                writer.write_i16(info.script_type_index.unwrap_or_default());
            }
            if format_version == 15 || format_version == 16 {
                writer.write_u8(info.stripped.unwrap_or_default());
            }
        }

        if format_version >= 11 {
            writer.write_i32(self.script_types.len() as i32);
            for script in &self.script_types {
                writer.write_i32(script.file_index);
                if format_version < 14 {
                    writer.write_i32(script.path_id as i32);
                } else {
                    writer.align(4);
                    writer.write_i64(script.path_id);
                }
            }
        }

        writer.write_i32(self.externals.len() as i32);
        for external in &self.externals {
            if format_version >= 6 {
                writer.write_cstring(external.asset_path.as_bytes());
            }
            if format_version >= 5 {
                writer.write_bytes(&external.guid);
                writer.write_i32(external.kind);
            }
            writer.write_cstring(external.path_name.as_bytes());
        }

        if format_version >= 20 {
            writer.write_i32(self.reference_types.len() as i32);
            for ty in &self.reference_types {
                write_serialized_type(
                    &mut writer,
                    ty,
                    format_version,
                    self.has_type_trees,
                    true,
                    common,
                )?;
            }
        }

        if format_version >= 5 {
            writer.write_cstring(self.user_information.as_bytes());
        }

        Ok(writer.into_inner())
    }
}
