//! Readers for the parts of a .msh file that [`mshio`] skips or doesn't keep:
//! node tags of contiguously numbered nodes, `$PhysicalNames`
//! and `$PartitionedEntities`.

use std::collections::HashMap;

use super::{EntityId, GmshError, PhysicalId};

/// How numbers are written in the data sections of a .msh file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Encoding {
    Ascii,
    Binary { size_t: usize, big_endian: bool },
}

impl Encoding {
    pub fn detect(bytes: &[u8], header: &mshio::MshHeader) -> Result<Self, GmshError> {
        if header.file_type == 0 {
            return Ok(Self::Ascii);
        }
        // binary headers are followed by the integer 1 in the file's byte order
        let format = section(bytes, "MeshFormat")
            .ok_or_else(|| malformed("MeshFormat", "section not found"))?;
        let one = format
            .iter()
            .position(|b| *b == b'\n')
            .and_then(|line_end| format.get(line_end + 1..line_end + 5))
            .ok_or_else(|| malformed("MeshFormat", "missing endianness marker"))?;
        Ok(Self::Binary {
            size_t: header.size_t_size,
            big_endian: one == 1i32.to_be_bytes(),
        })
    }
}

/// The contents of section `$name`, between its start and end lines.
pub(super) fn section<'a>(bytes: &'a [u8], name: &str) -> Option<&'a [u8]> {
    let (_, start) = find_line(bytes, format!("${name}").as_bytes(), 0)?;
    let (end, _) = find_line(bytes, format!("$End{name}").as_bytes(), start)?;
    Some(&bytes[start..end])
}

/// Position of the first line at or after `from` consisting of `marker`,
/// and the position right after that line's break.
fn find_line(bytes: &[u8], marker: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..bytes.len()).find_map(|pos| {
        let line_start = pos == 0 || bytes[pos - 1] == b'\n';
        let rest = bytes[pos..].strip_prefix(marker).filter(|_| line_start)?;
        let line_break = if rest.starts_with(b"\r\n") {
            2
        } else if rest.starts_with(b"\n") || rest.is_empty() {
            usize::from(!rest.is_empty())
        } else {
            return None;
        };
        Some((pos, pos + marker.len() + line_break))
    })
}

fn malformed(section: &str, what: impl std::fmt::Display) -> GmshError {
    GmshError::ParseError(format!("${section} section: {what}"))
}

/// Sequential reader over the numbers of one section.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    encoding: Encoding,
    section: &'static str,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], encoding: Encoding, section: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            encoding,
            section,
        }
    }

    fn error(&self, what: impl std::fmt::Display) -> GmshError {
        malformed(self.section, format_args!("{what} at byte {}", self.pos))
    }

    fn token(&mut self) -> Result<&'a str, GmshError> {
        let data = self.data;
        let rest = &data[self.pos..];
        let start = rest
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .ok_or_else(|| self.error("unexpected end of section"))?;
        let len = rest[start..]
            .iter()
            .position(u8::is_ascii_whitespace)
            .unwrap_or(rest.len() - start);
        self.pos += start + len;
        std::str::from_utf8(&rest[start..start + len]).map_err(|e| self.error(e))
    }

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], GmshError> {
        let chunk = self
            .data
            .get(self.pos..self.pos + N)
            .and_then(|chunk| <[u8; N]>::try_from(chunk).ok())
            .ok_or_else(|| self.error("unexpected end of section"))?;
        self.pos += N;
        Ok(chunk)
    }

    fn parse<T: std::str::FromStr>(&mut self) -> Result<T, GmshError>
    where
        T::Err: std::fmt::Display,
    {
        let token = self.token()?;
        token
            .parse()
            .map_err(|e| self.error(format_args!("invalid number {token:?}: {e}")))
    }

    /// A `size_t` value (counts and node tags).
    fn size(&mut self) -> Result<usize, GmshError> {
        let value = match self.encoding {
            Encoding::Ascii => return self.parse(),
            Encoding::Binary { size_t: 4, big_endian } => u64::from(if big_endian {
                u32::from_be_bytes(self.bytes()?)
            } else {
                u32::from_le_bytes(self.bytes()?)
            }),
            Encoding::Binary { size_t: 8, big_endian } => {
                if big_endian {
                    u64::from_be_bytes(self.bytes()?)
                } else {
                    u64::from_le_bytes(self.bytes()?)
                }
            }
            Encoding::Binary { size_t, .. } => {
                return Err(self.error(format_args!("unsupported size_t width {size_t}")))
            }
        };
        usize::try_from(value).map_err(|e| self.error(e))
    }

    fn int(&mut self) -> Result<i32, GmshError> {
        match self.encoding {
            Encoding::Ascii => self.parse(),
            Encoding::Binary {
                big_endian: true, ..
            } => Ok(i32::from_be_bytes(self.bytes()?)),
            Encoding::Binary {
                big_endian: false, ..
            } => Ok(i32::from_le_bytes(self.bytes()?)),
        }
    }

    /// A `size_t` count followed by that many ints.
    fn ints(&mut self) -> Result<Vec<i32>, GmshError> {
        let count = self.size()?;
        (0..count).map(|_| self.int()).collect()
    }

    fn skip_floats(&mut self, count: usize) -> Result<(), GmshError> {
        for _ in 0..count {
            match self.encoding {
                Encoding::Ascii => {
                    self.parse::<f64>()?;
                }
                Encoding::Binary { .. } => {
                    self.bytes::<8>()?;
                }
            }
        }
        Ok(())
    }
}

/// Node tags of every block of the `$Nodes` section, in file order.
pub(super) fn node_tags(bytes: &[u8], encoding: Encoding) -> Result<Vec<Vec<usize>>, GmshError> {
    let Some(data) = section(bytes, "Nodes") else {
        return Ok(Vec::new());
    };
    let mut reader = Reader::new(data, encoding, "Nodes");
    let block_count = reader.size()?;
    // total count and tag range
    for _ in 0..3 {
        reader.size()?;
    }

    let mut blocks = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        let _entity_dim = reader.int()?;
        let _entity_tag = reader.int()?;
        if reader.int()? != 0 {
            return Err(reader.error("parametric nodes are not supported"));
        }
        let count = reader.size()?;
        let tags = (0..count)
            .map(|_| reader.size())
            .collect::<Result<Vec<_>, _>>()?;
        reader.skip_floats(3 * count)?;
        blocks.push(tags);
    }
    Ok(blocks)
}

/// Names given to physical groups in the `$PhysicalNames` section.
///
/// This section is ASCII even in binary files.
pub(super) fn physical_names(bytes: &[u8]) -> Result<HashMap<PhysicalId, String>, GmshError> {
    let Some(data) = section(bytes, "PhysicalNames") else {
        return Ok(HashMap::new());
    };
    let text = std::str::from_utf8(data).map_err(|e| malformed("PhysicalNames", e))?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let count: usize = lines
        .next()
        .and_then(|l| l.parse().ok())
        .ok_or_else(|| malformed("PhysicalNames", "missing count"))?;

    let mut names = HashMap::with_capacity(count);
    for line in lines.take(count) {
        let parsed = line.split_once(char::is_whitespace).and_then(|(dim, rest)| {
            let (tag, name) = rest.trim_start().split_once(char::is_whitespace)?;
            let id = PhysicalId {
                dim: dim.parse().ok()?,
                tag: tag.parse().ok()?,
            };
            Some((id, name.trim().trim_matches('"').to_string()))
        });
        let (id, name) =
            parsed.ok_or_else(|| malformed("PhysicalNames", format_args!("bad line {line:?}")))?;
        names.insert(id, name);
    }
    if names.len() != count {
        return Err(malformed(
            "PhysicalNames",
            format_args!("expected {count} names, found {}", names.len()),
        ));
    }
    Ok(names)
}

/// An entity created by partitioning the mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct PartitionedEntity {
    pub id: EntityId,
    pub partitions: Vec<i32>,
    pub physical_tags: Vec<i32>,
}

/// Entities listed in the `$PartitionedEntities` section, ghost entities excluded.
pub(super) fn partitioned_entities(
    bytes: &[u8],
    encoding: Encoding,
) -> Result<Vec<PartitionedEntity>, GmshError> {
    let Some(data) = section(bytes, "PartitionedEntities") else {
        return Ok(Vec::new());
    };
    let mut reader = Reader::new(data, encoding, "PartitionedEntities");
    let _partition_count = reader.size()?;
    let ghost_count = reader.size()?;
    for _ in 0..ghost_count {
        // ghost entity tag and partition
        reader.int()?;
        reader.int()?;
    }
    let counts = [reader.size()?, reader.size()?, reader.size()?, reader.size()?];

    let mut entities = Vec::with_capacity(counts.iter().sum());
    for (dim, count) in (0..).zip(counts) {
        for _ in 0..count {
            let tag = reader.int()?;
            let _parent_dim = reader.int()?;
            let _parent_tag = reader.int()?;
            let partitions = reader.ints()?;
            // points store their position, everything else a bounding box
            reader.skip_floats(if dim == 0 { 3 } else { 6 })?;
            let physical_tags = reader.ints()?;
            if dim > 0 {
                let _bounding_entities = reader.ints()?;
            }
            entities.push(PartitionedEntity {
                id: EntityId { dim, tag },
                partitions,
                physical_tags,
            });
        }
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_found_at_line_starts() {
        let bytes = b"$A\n1 2\n$EndA\r\n$AB\nx\n$EndAB\n";
        assert_eq!(section(bytes, "A"), Some(&b"1 2\n"[..]));
        assert_eq!(section(bytes, "AB"), Some(&b"x\n"[..]));
        assert_eq!(section(bytes, "B"), None);
        // section names inside other lines don't count
        assert_eq!(section(b"x $A\n1\n$EndA\n", "A"), None);
    }

    #[test]
    fn ascii_and_binary_numbers() {
        let mut ascii = Reader::new(b" 2\n-7  12\n0.5 3\n", Encoding::Ascii, "Test");
        assert_eq!(ascii.ints().unwrap(), vec![-7, 12]);
        ascii.skip_floats(1).unwrap();
        assert_eq!(ascii.size().unwrap(), 3);
        assert!(ascii.size().is_err());

        let mut data = Vec::new();
        data.extend(2u64.to_be_bytes());
        data.extend((-7i32).to_be_bytes());
        data.extend(12i32.to_be_bytes());
        data.extend(0.5f64.to_be_bytes());
        data.extend(9u64.to_be_bytes());
        let encoding = Encoding::Binary {
            size_t: 8,
            big_endian: true,
        };
        let mut binary = Reader::new(&data, encoding, "Test");
        assert_eq!(binary.ints().unwrap(), vec![-7, 12]);
        binary.skip_floats(1).unwrap();
        assert_eq!(binary.size().unwrap(), 9);
        assert!(binary.int().is_err());
    }

    #[test]
    fn names_with_spaces() {
        let bytes = b"$PhysicalNames\n2\n1 3 \"left wall\"\n2 3 \"fluid\"\n$EndPhysicalNames\n";
        let names = physical_names(bytes).unwrap();
        assert_eq!(names[&PhysicalId { dim: 1, tag: 3 }], "left wall");
        assert_eq!(names[&PhysicalId { dim: 2, tag: 3 }], "fluid");

        let truncated = b"$PhysicalNames\n2\n1 3 \"left wall\"\n$EndPhysicalNames\n";
        assert!(matches!(
            physical_names(truncated),
            Err(GmshError::ParseError(_))
        ));
    }
}
