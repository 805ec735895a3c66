//! CPU staging of shader uniform blocks, addressed by uniform name.
//!
//! A [`UniformLayout`] maps names such as `view`, `material.shininess` or
//! `pointLights[2].linear` to byte offsets inside the block. Writes to names
//! the program does not declare are dropped, the same way a graphics API
//! ignores an unknown uniform location.

use std::collections::{BTreeMap, HashSet};

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use log::{debug, warn};

/// Leaf value types a uniform slot can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Uint,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformKind {
    pub fn size(self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::Uint => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            // three vec3 columns, each padded to 16 bytes
            Self::Mat3 => 48,
            Self::Mat4 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Flattened description of one uniform buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformLayout {
    slots: BTreeMap<String, UniformSlot>,
    size: u32,
}

impl UniformLayout {
    pub fn new(size: u32) -> Self {
        Self {
            slots: BTreeMap::new(),
            size,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, slot: UniformSlot) {
        self.slots.insert(name.into(), slot);
    }

    pub fn get(&self, name: &str) -> Option<UniformSlot> {
        self.slots.get(name).copied()
    }

    /// Block size in bytes, rounded up to 16 as uniform buffers require.
    pub fn size(&self) -> u32 {
        self.size.next_multiple_of(16)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, UniformSlot)> {
        self.slots.iter().map(|(name, slot)| (name.as_str(), *slot))
    }
}

/// Destination for named uniform writes.
pub trait UniformSink {
    fn set_mat4(&mut self, name: &str, value: Mat4);
    fn set_mat3(&mut self, name: &str, value: Mat3);
    fn set_vec4(&mut self, name: &str, value: Vec4);
    fn set_vec3(&mut self, name: &str, value: Vec3);
    fn set_vec2(&mut self, name: &str, value: Vec2);
    fn set_f32(&mut self, name: &str, value: f32);
    fn set_i32(&mut self, name: &str, value: i32);
}

/// Byte image of a uniform block plus the layout used to address it.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: UniformLayout,
    data: Vec<u8>,
    reported: HashSet<String>,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let data = vec![0; layout.size() as usize];
        Self {
            layout,
            data,
            reported: HashSet::new(),
        }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    fn write(&mut self, name: &str, kind: UniformKind, bytes: &[u8]) {
        let Some(slot) = self.layout.get(name) else {
            if self.reported.insert(name.to_string()) {
                debug!("uniform {name} is not declared by the program; ignoring");
            }
            return;
        };
        if slot.kind != kind {
            if self.reported.insert(name.to_string()) {
                warn!(
                    "uniform {name} is {:?} but a {:?} was written; ignoring",
                    slot.kind, kind
                );
            }
            return;
        }
        let start = slot.offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl UniformSink for UniformBlock {
    fn set_mat4(&mut self, name: &str, value: Mat4) {
        self.write(name, UniformKind::Mat4, bytemuck::cast_slice(&value.to_cols_array()));
    }

    fn set_mat3(&mut self, name: &str, value: Mat3) {
        let mut padded = [0.0f32; 12];
        for (column, chunk) in padded.chunks_exact_mut(4).enumerate() {
            chunk[..3].copy_from_slice(&value.col(column).to_array());
        }
        self.write(name, UniformKind::Mat3, bytemuck::cast_slice(&padded));
    }

    fn set_vec4(&mut self, name: &str, value: Vec4) {
        self.write(name, UniformKind::Vec4, bytemuck::cast_slice(&value.to_array()));
    }

    fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.write(name, UniformKind::Vec3, bytemuck::cast_slice(&value.to_array()));
    }

    fn set_vec2(&mut self, name: &str, value: Vec2) {
        self.write(name, UniformKind::Vec2, bytemuck::cast_slice(&value.to_array()));
    }

    fn set_f32(&mut self, name: &str, value: f32) {
        self.write(name, UniformKind::Float, bytemuck::bytes_of(&value));
    }

    fn set_i32(&mut self, name: &str, value: i32) {
        self.write(name, UniformKind::Int, bytemuck::bytes_of(&value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> UniformLayout {
        let mut layout = UniformLayout::new(84);
        layout.insert(
            "model",
            UniformSlot {
                offset: 0,
                kind: UniformKind::Mat4,
            },
        );
        layout.insert(
            "light.position",
            UniformSlot {
                offset: 64,
                kind: UniformKind::Vec3,
            },
        );
        layout.insert(
            "light.constant",
            UniformSlot {
                offset: 76,
                kind: UniformKind::Float,
            },
        );
        layout.insert(
            "count",
            UniformSlot {
                offset: 80,
                kind: UniformKind::Int,
            },
        );
        layout
    }

    fn f32_at(block: &UniformBlock, offset: usize) -> f32 {
        bytemuck::pod_read_unaligned(&block.bytes()[offset..offset + 4])
    }

    #[test]
    fn size_rounds_to_sixteen() {
        assert_eq!(layout().size(), 96);
        assert_eq!(UniformBlock::new(layout()).bytes().len(), 96);
    }

    #[test]
    fn writes_land_at_slot_offsets() {
        let mut block = UniformBlock::new(layout());
        block.set_vec3("light.position", Vec3::new(1.0, 2.0, 3.0));
        block.set_f32("light.constant", 0.5);
        block.set_i32("count", 7);
        block.set_mat4("model", Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0)));

        assert_eq!(f32_at(&block, 64), 1.0);
        assert_eq!(f32_at(&block, 72), 3.0);
        assert_eq!(f32_at(&block, 76), 0.5);
        let count: i32 = bytemuck::pod_read_unaligned(&block.bytes()[80..84]);
        assert_eq!(count, 7);
        // column-major: translation lives in the fourth column
        assert_eq!(f32_at(&block, 48), 4.0);
        assert_eq!(f32_at(&block, 60), 1.0);
    }

    #[test]
    fn unknown_names_are_ignored() {
        let mut block = UniformBlock::new(layout());
        block.set_vec3("pointLights[9].position", Vec3::ONE);
        assert!(block.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn kind_mismatch_leaves_block_untouched() {
        let mut block = UniformBlock::new(layout());
        block.set_vec3("light.constant", Vec3::splat(9.0));
        block.set_f32("model", 2.0);
        assert!(block.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn mat3_columns_are_padded() {
        let mut layout = UniformLayout::new(48);
        layout.insert(
            "normalMatrix",
            UniformSlot {
                offset: 0,
                kind: UniformKind::Mat3,
            },
        );
        let mut block = UniformBlock::new(layout);
        block.set_mat3("normalMatrix", Mat3::from_diagonal(Vec3::new(2.0, 3.0, 4.0)));
        assert_eq!(f32_at(&block, 0), 2.0);
        assert_eq!(f32_at(&block, 12), 0.0);
        assert_eq!(f32_at(&block, 20), 3.0);
        assert_eq!(f32_at(&block, 40), 4.0);
    }

    #[test]
    fn empty_layout_has_no_bytes() {
        let block = UniformBlock::new(UniformLayout::default());
        assert!(block.is_empty());
        assert!(block.bytes().is_empty());
    }
}
