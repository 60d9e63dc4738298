//! Mesh-boolean collaborator seam
//!
//! Real CSG is performed by an external engine; this crate only defines the
//! contract and wires results back into the entity graph (see
//! `ModelObject::make_boolean`). Engines may legitimately return zero pieces
//! (the operation annihilated the geometry) or several (the result fell
//! apart into disconnected components).

use crate::error::Result;
use crate::mesh::TriangleMesh;

/// The CSG operation to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    /// Merge both operands into one solid
    Union,
    /// Subtract the second operand from the first
    ANotB,
    /// Keep only the overlap of the operands
    Intersection,
}

impl BooleanOp {
    /// Wire form used by external boolean engines
    pub fn as_str(self) -> &'static str {
        match self {
            BooleanOp::Union => "UNION",
            BooleanOp::ANotB => "A_NOT_B",
            BooleanOp::Intersection => "INTERSECTION",
        }
    }

    /// Parse the wire form; unknown strings yield `None`
    pub fn from_str(s: &str) -> Option<BooleanOp> {
        match s {
            "UNION" => Some(BooleanOp::Union),
            "A_NOT_B" => Some(BooleanOp::ANotB),
            "INTERSECTION" => Some(BooleanOp::Intersection),
            _ => None,
        }
    }
}

impl std::fmt::Display for BooleanOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External CSG engine
///
/// Operands arrive already baked into a common coordinate space; the engine
/// returns the result as disconnected components.
pub trait MeshBoolean {
    /// Apply `op` to `a` and `b`, returning the disconnected result pieces
    fn boolean(
        &self,
        a: &TriangleMesh,
        b: &TriangleMesh,
        op: BooleanOp,
    ) -> Result<Vec<TriangleMesh>>;
}
