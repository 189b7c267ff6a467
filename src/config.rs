use basalt_terrain::{RoamConfig, TessConfig};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which level-of-detail strategy draws the ground.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum MeshDrawerKind {
    Roam,
    /// Falls back to `Roam` on devices without tessellation support.
    Tessellated,
}

impl Default for MeshDrawerKind {
    fn default() -> Self {
        Self::Roam
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    pub drawer: MeshDrawerKind,
    pub roam: RoamConfig,
    pub tess: TessConfig,
}

impl Config {
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self, ron::Error> {
        let reader = std::fs::File::open(path)?;

        ron::de::from_reader(reader)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
