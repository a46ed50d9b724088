use serde::{Deserialize, Serialize};

/// Billboard geometry generated per particle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillboardMode {
    /// Quad facing the view plane
    ScreenAligned,
    /// Quad facing the view position
    ViewposAligned,
    /// Quad stretched along an axis
    AxisAligned,
    /// Axis aligned quad with rounded depth
    AxisAlignedSpheroid,
    /// Axis aligned quad with capped ends
    AxisAlignedCapsule,
    /// Quad in a fixed plane
    PlaneAligned,
}

impl BillboardMode {
    pub const ALL: [BillboardMode; 6] = [
        BillboardMode::ScreenAligned,
        BillboardMode::ViewposAligned,
        BillboardMode::AxisAligned,
        BillboardMode::AxisAlignedSpheroid,
        BillboardMode::AxisAlignedCapsule,
        BillboardMode::PlaneAligned,
    ];

    pub fn vertices_per_particle(self) -> u32 {
        match self {
            BillboardMode::AxisAlignedCapsule => 6,
            _ => 4,
        }
    }

    pub fn indices_per_particle(self) -> u32 {
        match self {
            BillboardMode::AxisAlignedCapsule => 12,
            _ => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_counts() {
        for mode in BillboardMode::ALL {
            let (vpp, ipp) = (mode.vertices_per_particle(), mode.indices_per_particle());
            // Two triangles per quad, four for the capsule
            assert_eq!(ipp, (vpp - 2) * 3, "{:?}", mode);
        }
        assert_eq!(BillboardMode::AxisAlignedCapsule.vertices_per_particle(), 6);
        assert_eq!(BillboardMode::ScreenAligned.indices_per_particle(), 6);
    }
}
