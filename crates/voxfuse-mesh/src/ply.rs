//! ASCII PLY reader and writer for [`TriangleMesh`].
//!
//! The writer emits the attributes the mesh actually carries:
//!
//! ```text
//! ply
//! format ascii 1.0
//! element vertex N
//! property float x            ┐
//! property float y            │ always
//! property float z            ┘
//! property float nx           ┐
//! property float ny           │ when normals are present
//! property float nz           ┘
//! property uchar red          ┐
//! property uchar green        │ when colors are present
//! property uchar blue         ┘
//! element face K              ┐ when the mesh has triangles
//! property list uchar int vertex_index ┘
//! end_header
//! ```
//!
//! followed by one line per vertex and one `3 i j k` line per triangle.
//! Floats are printed with the shortest representation that reads back to
//! the same `f32`.
//!
//! The reader accepts the same subset: ASCII only, a `vertex` element whose
//! property names decide which attributes are present, and an optional
//! triangle-only `face` element.
//!
//! # Example
//!
//! ```rust
//! use voxfuse_mesh::ply::{read_ply_from, write_ply_to};
//! use voxfuse_types::TriangleMesh;
//!
//! let mesh = TriangleMesh::new(
//!     vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
//!     None,
//!     Some(vec![[255, 0, 0]; 3]),
//!     vec![[0, 1, 2]],
//! )
//! .unwrap();
//!
//! let mut buf = Vec::new();
//! write_ply_to(&mut buf, &mesh).unwrap();
//! let back = read_ply_from(buf.as_slice()).unwrap();
//! assert_eq!(back, mesh);
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use tracing::debug;
use voxfuse_types::{TriangleMesh, VoxError};

/// Upper bound on rows reserved up front; element counts come from an
/// untrusted header and larger bodies grow as they are read.
const MAX_PREALLOCATED_ROWS: usize = 1 << 16;

// ────────────────────────────────────────────────────────────────────────────
// Writer
// ────────────────────────────────────────────────────────────────────────────

/// Write `mesh` as ASCII PLY to `path`, creating or truncating the file.
pub fn write_ply(path: impl AsRef<Path>, mesh: &TriangleMesh) -> Result<(), VoxError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_ply_to(BufWriter::new(file), mesh)?;
    debug!(
        path = %path.display(),
        points = mesh.points.len(),
        triangles = mesh.triangles.len(),
        "wrote PLY"
    );
    Ok(())
}

/// Write `mesh` as ASCII PLY to any writer.
pub fn write_ply_to<W: Write>(mut w: W, mesh: &TriangleMesh) -> Result<(), VoxError> {
    writeln!(w, "ply")?;
    writeln!(w, "format ascii 1.0")?;
    writeln!(w, "element vertex {}", mesh.points.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(w, "property float {axis}")?;
    }
    if mesh.normals.is_some() {
        for axis in ["nx", "ny", "nz"] {
            writeln!(w, "property float {axis}")?;
        }
    }
    if mesh.colors.is_some() {
        for channel in ["red", "green", "blue"] {
            writeln!(w, "property uchar {channel}")?;
        }
    }
    if !mesh.triangles.is_empty() {
        writeln!(w, "element face {}", mesh.triangles.len())?;
        writeln!(w, "property list uchar int vertex_index")?;
    }
    writeln!(w, "end_header")?;

    for (i, [x, y, z]) in mesh.points.iter().enumerate() {
        write!(w, "{x} {y} {z}")?;
        if let Some([nx, ny, nz]) = mesh.normals.as_ref().and_then(|n| n.get(i)) {
            write!(w, " {nx} {ny} {nz}")?;
        }
        if let Some([r, g, b]) = mesh.colors.as_ref().and_then(|c| c.get(i)) {
            write!(w, " {r} {g} {b}")?;
        }
        writeln!(w)?;
    }
    for [a, b, c] in &mesh.triangles {
        writeln!(w, "3 {a} {b} {c}")?;
    }

    w.flush()?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Reader
// ────────────────────────────────────────────────────────────────────────────

/// Read an ASCII PLY file from `path`.
pub fn read_ply(path: impl AsRef<Path>) -> Result<TriangleMesh, VoxError> {
    let file = File::open(path.as_ref())?;
    read_ply_from(BufReader::new(file))
}

/// Read an ASCII PLY mesh from any buffered reader.
///
/// # Errors
///
/// Returns [`VoxError::MeshFormat`] for a malformed or unsupported header,
/// a short or malformed body, or a triangle referencing a missing vertex.
pub fn read_ply_from<R: BufRead>(reader: R) -> Result<TriangleMesh, VoxError> {
    let mut lines = reader.lines();
    let header = Header::parse(&mut lines)?;
    let layout = VertexLayout::from_properties(&header.vertex_properties)?;

    let vertex_rows = header.vertex_count.min(MAX_PREALLOCATED_ROWS);
    let mut points = Vec::with_capacity(vertex_rows);
    let mut normals = layout.normals.map(|_| Vec::with_capacity(vertex_rows));
    let mut colors = layout.colors.map(|_| Vec::with_capacity(vertex_rows));

    for i in 0..header.vertex_count {
        let line = next_body_line(&mut lines, "vertex", i)?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != header.vertex_properties.len() {
            return Err(VoxError::MeshFormat(format!(
                "vertex {i} has {} values, header declares {}",
                fields.len(),
                header.vertex_properties.len()
            )));
        }
        points.push(parse_triple::<f32>(&fields, layout.position, "position", i)?);
        if let (Some(cols), Some(out)) = (layout.normals, normals.as_mut()) {
            out.push(parse_triple::<f32>(&fields, cols, "normal", i)?);
        }
        if let (Some(cols), Some(out)) = (layout.colors, colors.as_mut()) {
            out.push(parse_triple::<u8>(&fields, cols, "color", i)?);
        }
    }

    let mut triangles = Vec::with_capacity(header.face_count.min(MAX_PREALLOCATED_ROWS));
    for i in 0..header.face_count {
        let line = next_body_line(&mut lines, "face", i)?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() != Some(&"3") || fields.len() != 4 {
            return Err(VoxError::MeshFormat(format!(
                "face {i} is not a triangle: '{}'",
                line.trim()
            )));
        }
        triangles.push(parse_triple::<u32>(&fields, [1, 2, 3], "face", i)?);
    }

    TriangleMesh::new(points, normals, colors, triangles)
}

/// The parts of a PLY header this reader understands.
#[derive(Debug, Default)]
struct Header {
    vertex_count: usize,
    vertex_properties: Vec<String>,
    face_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Element {
    None,
    Vertex,
    Face,
}

impl Header {
    fn parse<I>(lines: &mut I) -> Result<Self, VoxError>
    where
        I: Iterator<Item = std::io::Result<String>>,
    {
        let mut header = Header::default();
        let mut current = Element::None;
        let mut saw_format = false;

        match lines.next().transpose()? {
            Some(magic) if magic.trim() == "ply" => {}
            _ => return Err(VoxError::MeshFormat("missing 'ply' magic line".to_string())),
        }

        for line in lines.by_ref() {
            let line = line?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [] | ["comment", ..] | ["obj_info", ..] => {}
                ["format", "ascii", _] => saw_format = true,
                ["format", other, ..] => {
                    return Err(VoxError::MeshFormat(format!(
                        "unsupported PLY format '{other}', only ascii is read"
                    )));
                }
                ["element", "vertex", n] => {
                    header.vertex_count = parse_count(n, "vertex")?;
                    current = Element::Vertex;
                }
                ["element", "face", n] => {
                    header.face_count = parse_count(n, "face")?;
                    current = Element::Face;
                }
                ["element", other, ..] => {
                    return Err(VoxError::MeshFormat(format!(
                        "unsupported element '{other}'"
                    )));
                }
                ["property", "list", _, _, _] if current == Element::Face => {}
                ["property", _, name] if current == Element::Vertex => {
                    header.vertex_properties.push((*name).to_string());
                }
                ["property", ..] => {
                    return Err(VoxError::MeshFormat(format!(
                        "unexpected property line '{line}'"
                    )));
                }
                ["end_header"] => {
                    if !saw_format {
                        return Err(VoxError::MeshFormat("missing format line".to_string()));
                    }
                    return Ok(header);
                }
                _ => {
                    return Err(VoxError::MeshFormat(format!(
                        "unrecognised header line '{line}'"
                    )));
                }
            }
        }
        Err(VoxError::MeshFormat("missing end_header".to_string()))
    }
}

/// Column positions of each attribute inside a vertex line.
#[derive(Debug, Clone, Copy)]
struct VertexLayout {
    position: [usize; 3],
    normals: Option<[usize; 3]>,
    colors: Option<[usize; 3]>,
}

impl VertexLayout {
    fn from_properties(names: &[String]) -> Result<Self, VoxError> {
        let find = |wanted: [&str; 3]| -> Result<Option<[usize; 3]>, VoxError> {
            let found = wanted.map(|w| names.iter().position(|n| n == w));
            match found {
                [Some(a), Some(b), Some(c)] => Ok(Some([a, b, c])),
                [None, None, None] => Ok(None),
                _ => Err(VoxError::MeshFormat(format!(
                    "incomplete attribute: need all of {wanted:?}"
                ))),
            }
        };
        let position = find(["x", "y", "z"])?
            .ok_or_else(|| VoxError::MeshFormat("vertex element lacks x y z".to_string()))?;
        Ok(Self {
            position,
            normals: find(["nx", "ny", "nz"])?,
            colors: find(["red", "green", "blue"])?,
        })
    }
}

fn parse_count(token: &str, element: &str) -> Result<usize, VoxError> {
    token
        .parse()
        .map_err(|_| VoxError::MeshFormat(format!("invalid {element} count '{token}'")))
}

fn next_body_line<I>(lines: &mut I, element: &str, index: usize) -> Result<String, VoxError>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    lines
        .next()
        .transpose()?
        .ok_or_else(|| VoxError::MeshFormat(format!("file ends before {element} {index}")))
}

fn parse_triple<T: FromStr>(
    fields: &[&str],
    columns: [usize; 3],
    what: &str,
    index: usize,
) -> Result<[T; 3], VoxError> {
    let parse = |col: usize| -> Result<T, VoxError> {
        fields[col].parse().map_err(|_| {
            VoxError::MeshFormat(format!("invalid {what} value '{}' at row {index}", fields[col]))
        })
    };
    Ok([parse(columns[0])?, parse(columns[1])?, parse(columns[2])?])
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
