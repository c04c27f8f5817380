//! Engine class identifiers

use std::{fmt, str::FromStr};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Identifier of an engine class, as stored in type and object rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(transparent))]
pub struct ClassId(pub i32);

macro_rules! class_ids {
    ($($name:ident = $id:literal => $text:literal,)*) => {
        impl ClassId {
            $(pub const $name: ClassId = ClassId($id);)*

            const NAMES: &'static [(ClassId, &'static str)] = &[$((ClassId($id), $text),)*];
        }
    };
}

class_ids! {
    OBJECT = 0 => "Object",
    GAME_OBJECT = 1 => "GameObject",
    COMPONENT = 2 => "Component",
    TRANSFORM = 4 => "Transform",
    BEHAVIOUR = 8 => "Behaviour",
    MATERIAL = 21 => "Material",
    MESH_RENDERER = 23 => "MeshRenderer",
    RENDERER = 25 => "Renderer",
    TEXTURE_2D = 28 => "Texture2D",
    MESH_FILTER = 33 => "MeshFilter",
    MESH = 43 => "Mesh",
    SHADER = 48 => "Shader",
    TEXT_ASSET = 49 => "TextAsset",
    ANIMATION_CLIP = 74 => "AnimationClip",
    AUDIO_SOURCE = 82 => "AudioSource",
    AUDIO_CLIP = 83 => "AudioClip",
    CUBEMAP = 89 => "Cubemap",
    AVATAR = 90 => "Avatar",
    ANIMATOR_CONTROLLER = 91 => "AnimatorController",
    ANIMATOR = 95 => "Animator",
    MONO_BEHAVIOUR = 114 => "MonoBehaviour",
    MONO_SCRIPT = 115 => "MonoScript",
    FONT = 128 => "Font",
    SKINNED_MESH_RENDERER = 137 => "SkinnedMeshRenderer",
    BUILD_SETTINGS = 141 => "BuildSettings",
    ASSET_BUNDLE = 142 => "AssetBundle",
    PRELOAD_DATA = 150 => "PreloadData",
    MOVIE_TEXTURE = 152 => "MovieTexture",
    TERRAIN_DATA = 156 => "TerrainData",
    TEXTURE_2D_ARRAY = 187 => "Texture2DArray",
    PARTICLE_SYSTEM = 198 => "ParticleSystem",
    SPRITE_RENDERER = 212 => "SpriteRenderer",
    SPRITE = 213 => "Sprite",
    RECT_TRANSFORM = 224 => "RectTransform",
    ASSET_BUNDLE_MANIFEST = 290 => "AssetBundleManifest",
    VIDEO_CLIP = 329 => "VideoClip",
    SPRITE_ATLAS = 687078895 => "SpriteAtlas",
}

impl ClassId {
    /// Engine name of the class, if it is a well known one
    pub fn name(self) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(id, _)| *id == self)
            .map(|(_, name)| *name)
    }
}

impl From<i32> for ClassId {
    fn from(value: i32) -> Self {
        ClassId(value)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "class {}", self.0),
        }
    }
}

/// Accepts either a known class name or a number
impl FromStr for ClassId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<i32>() {
            return Ok(ClassId(id));
        }
        Self::NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(id, _)| *id)
            .ok_or_else(|| format!("unknown class {s:?}"))
    }
}
