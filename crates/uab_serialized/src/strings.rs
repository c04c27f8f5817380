//! The string table built into the engine
//!
//! Blob type trees store names as offsets. An offset with the high bit set points into
//! this table, any other offset into the string buffer of the type tree itself.

use std::{collections::HashMap, sync::OnceLock};

/// Marks an offset into [`COMMON_STRINGS`]
pub const COMMON_STRING_FLAG: u32 = 0x8000_0000;

/// Null separated names shared by every serialized file
pub const COMMON_STRINGS: &str = concat!(
    "AABB\0", "AnimationClip\0", "AnimationCurve\0", "AnimationState\0", "Array\0",
    "Base\0", "BitField\0", "bitset\0", "bool\0", "char\0", "ColorRGBA\0", "Component\0",
    "data\0", "deque\0", "double\0", "dynamic_array\0", "FastPropertyName\0", "first\0",
    "float\0", "Font\0", "GameObject\0", "Generic Mono\0", "GradientNEW\0", "GUID\0",
    "GUIStyle\0", "int\0", "list\0", "long long\0", "map\0", "Matrix4x4f\0", "MdFour\0",
    "MonoBehaviour\0", "MonoScript\0", "m_ByteSize\0", "m_Curve\0",
    "m_EditorClassIdentifier\0", "m_EditorHideFlags\0", "m_Enabled\0", "m_ExtensionPtr\0",
    "m_GameObject\0", "m_Index\0", "m_IsArray\0", "m_IsStatic\0", "m_MetaFlag\0",
    "m_Name\0", "m_ObjectHideFlags\0", "m_PrefabInternal\0", "m_PrefabParentObject\0",
    "m_Script\0", "m_StaticEditorFlags\0", "m_Type\0", "m_Version\0", "Object\0", "pair\0",
    "PPtr<Component>\0", "PPtr<GameObject>\0", "PPtr<Material>\0", "PPtr<MonoBehaviour>\0",
    "PPtr<MonoScript>\0", "PPtr<Object>\0", "PPtr<Prefab>\0", "PPtr<Sprite>\0",
    "PPtr<TextAsset>\0", "PPtr<Texture>\0", "PPtr<Texture2D>\0", "PPtr<Transform>\0",
    "Prefab\0", "Quaternionf\0", "Rectf\0", "RectInt\0", "RectOffset\0", "second\0",
    "set\0", "short\0", "size\0", "SInt16\0", "SInt32\0", "SInt64\0", "SInt8\0",
    "staticvector\0", "string\0", "TextAsset\0", "TextMesh\0", "Texture\0", "Texture2D\0",
    "Transform\0", "TypelessData\0", "UInt16\0", "UInt32\0", "UInt64\0", "UInt8\0",
    "unsigned int\0", "unsigned long long\0", "unsigned short\0", "vector\0", "Vector2f\0",
    "Vector3f\0", "Vector4f\0", "m_ScriptingClassIdentifier\0", "Gradient\0", "Type*\0",
    "int2_storage\0", "int3_storage\0", "BoundsInt\0", "m_CorrespondingSourceObject\0",
    "m_PrefabInstance\0", "m_PrefabAsset\0", "FileSize\0", "Hash128\0",
);

/// Read the null terminated string starting at `offset`, or nothing when out of range
pub fn string_at(buffer: &[u8], offset: usize) -> &str {
    let Some(tail) = buffer.get(offset..) else {
        return "";
    };
    let end = tail.iter().position(|byte| *byte == 0).unwrap_or(tail.len());
    std::str::from_utf8(&tail[..end]).unwrap_or("")
}

/// Resolve a type tree string offset against the common table or the local buffer
pub fn resolve(local: &[u8], offset: u32) -> &str {
    if offset & COMMON_STRING_FLAG != 0 {
        string_at(
            COMMON_STRINGS.as_bytes(),
            (offset & !COMMON_STRING_FLAG) as usize,
        )
    } else {
        string_at(local, offset as usize)
    }
}

/// Offset of `name` in the common table, flag included
pub fn common_offset(name: &str) -> Option<u32> {
    static OFFSETS: OnceLock<HashMap<&'static str, u32>> = OnceLock::new();
    OFFSETS
        .get_or_init(|| {
            let mut offsets = HashMap::new();
            let mut start = 0;
            for entry in COMMON_STRINGS.split_terminator('\0') {
                offsets.insert(entry, start as u32 | COMMON_STRING_FLAG);
                start += entry.len() + 1;
            }
            offsets
        })
        .get(name)
        .copied()
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{common_offset, resolve, COMMON_STRING_FLAG};

    #[test]
    fn high_bit_selects_common_table() {
        let local = b"m_Speed\0m_Name\0";
        assert_eq!(resolve(local, COMMON_STRING_FLAG), "AABB");
        assert_eq!(resolve(local, COMMON_STRING_FLAG | 427), "m_Name");
        assert_eq!(resolve(local, COMMON_STRING_FLAG | 1161), "Hash128");
        assert_eq!(resolve(local, 0), "m_Speed");
        assert_eq!(resolve(local, 8), "m_Name");
    }

    #[test]
    fn out_of_range_is_empty() {
        assert_eq!(resolve(b"abc\0", 400), "");
        assert_eq!(resolve(b"abc\0", COMMON_STRING_FLAG | 100_000), "");
    }

    #[test]
    fn common_offsets() {
        assert_eq!(common_offset("Base"), Some(COMMON_STRING_FLAG | 55));
        assert_eq!(common_offset("int"), Some(COMMON_STRING_FLAG | 222));
        assert_eq!(common_offset("m_Speed"), None);
    }
}
