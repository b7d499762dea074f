//! Geometry exporters over the instance's vertex buffer.

use std::io::Write;

use crate::error::{Error, ErrorKind};
use crate::instance::Instance;

fn io_error(err: std::io::Error) -> Error {
    Error::io(format!("Export failed: {err}"))
}

/// Wavefront OBJ: `v` and `vn` lines per vertex, one `f` per three
/// consecutive vertices. Supports the default position/normal layout.
pub fn export_obj(instance: &Instance, out: &mut dyn Write) -> Result<(), Error> {
    let layout = instance.layout();
    if (layout.position, layout.uv, layout.normal, layout.color) != (3, 0, 3, 0) {
        return Err(Error::new(
            ErrorKind::Format,
            "OBJ export supports the position/normal vertex layout only",
        ));
    }

    let stride = layout.size();
    let vertices = instance.vertices();
    let count = instance.vertex_count();

    for vertex in 0..count {
        let base = vertex * stride;
        writeln!(
            out,
            "v {:.6} {:.6} {:.6}",
            vertices[base], vertices[base + 1], vertices[base + 2]
        )
        .map_err(io_error)?;
    }
    for vertex in 0..count {
        let base = vertex * stride;
        writeln!(
            out,
            "vn {:.6} {:.6} {:.6}",
            vertices[base + 3], vertices[base + 4], vertices[base + 5]
        )
        .map_err(io_error)?;
    }
    for face in 0..count / 3 {
        let (a, b, c) = (face * 3 + 1, face * 3 + 2, face * 3 + 3);
        writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}").map_err(io_error)?;
    }
    Ok(())
}

/// Tightly packed little-endian 32-bit floats, every component of every
/// vertex in emission order, no header.
pub fn export_triangles(instance: &Instance, out: &mut dyn Write) -> Result<(), Error> {
    for component in instance.vertices() {
        out.write_all(&component.to_le_bytes()).map_err(io_error)?;
    }
    Ok(())
}
