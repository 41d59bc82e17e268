// SPDX-License-Identifier: CEPL-1.0
//! SPIR-V loading and transient shader modules.
use ash::util::read_spv;
use ash::vk;
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::error::{InitError, InitResult};

pub const DEFAULT_ENTRY_POINT: &CStr = c"main";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decodes a SPIR-V binary into words. The length must be a multiple of four
/// and the first word the SPIR-V magic number (either endianness).
pub fn parse_spirv(path: &Path, bytes: &[u8]) -> InitResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(InitError::ShaderModuleInvalid {
            path: path.to_path_buf(),
            reason: "file is empty".into(),
        });
    }
    read_spv(&mut Cursor::new(bytes)).map_err(|e| InitError::ShaderModuleInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn read_spirv_words(path: &Path) -> InitResult<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| InitError::ShaderFileNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    parse_spirv(path, &bytes)
}

/// A `VkShaderModule` that lives only as long as pipeline creation needs it.
pub struct ShaderModule<'d> {
    device: &'d ash::Device,
    module: vk::ShaderModule,
}

/// Reads `path` as SPIR-V and hands it to the driver.
pub fn create_shader_module<'d>(device: &'d ash::Device, path: &Path) -> InitResult<ShaderModule<'d>> {
    let words = read_spirv_words(path)?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        code_size: words.len() * 4,
        p_code: words.as_ptr(),
        ..Default::default()
    };
    let module = unsafe { device.create_shader_module(&ci, None) }.map_err(|e| {
        InitError::ShaderModuleInvalid {
            path: path.to_path_buf(),
            reason: format!("create_shader_module: {e}"),
        }
    })?;
    debug!("shader module {:?} ({} words)", path, words.len());
    Ok(ShaderModule { device, module })
}

impl ShaderModule<'_> {
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

/// One programmable stage of a pipeline.
#[derive(Clone, Copy, Debug)]
pub struct ShaderStageDesc<'a> {
    pub stage: ShaderStage,
    pub module: vk::ShaderModule,
    pub entry_point: &'a CStr,
}

impl ShaderStageDesc<'static> {
    /// `module` run from its `main` entry point.
    pub fn main(stage: ShaderStage, module: &ShaderModule<'_>) -> Self {
        Self {
            stage,
            module: module.handle(),
            entry_point: DEFAULT_ENTRY_POINT,
        }
    }
}

impl<'a> ShaderStageDesc<'a> {
    pub fn create_info(&self) -> vk::PipelineShaderStageCreateInfo<'a> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(self.entry_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: u32 = 0x0723_0203;

    #[test]
    fn stage_flags() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.to_vk_stage(), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn parse_accepts_magic_prefixed_words() {
        let mut bytes = MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = parse_spirv(Path::new("ok.spv"), &bytes).unwrap();
        assert_eq!(words, [MAGIC, 0x0001_0000]);
    }

    #[test]
    fn parse_rejects_garbage() {
        let bytes = [0xABu8; 12];
        match parse_spirv(Path::new("garbage.spv"), &bytes) {
            Err(InitError::ShaderModuleInvalid { path, .. }) => {
                assert_eq!(path, Path::new("garbage.spv"))
            }
            other => panic!("expected ShaderModuleInvalid, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_unaligned_length() {
        let mut bytes = MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 6]);
        assert_eq!(bytes.len(), 10);
        assert!(matches!(
            parse_spirv(Path::new("short.spv"), &bytes),
            Err(InitError::ShaderModuleInvalid { .. })
        ));
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(matches!(
            parse_spirv(Path::new("empty.spv"), &[]),
            Err(InitError::ShaderModuleInvalid { .. })
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let path = Path::new("definitely/not/here.spv");
        match read_spirv_words(path) {
            Err(InitError::ShaderFileNotFound { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected ShaderFileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn bundled_shaders_parse() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../shaders");
        for name in ["vertex.vert.spv", "fragment.frag.spv"] {
            let words = read_spirv_words(&root.join(name)).unwrap();
            assert_eq!(words[0], MAGIC);
        }
    }

    #[test]
    fn stage_desc_uses_main() {
        let desc = ShaderStageDesc {
            stage: ShaderStage::Vertex,
            module: vk::ShaderModule::null(),
            entry_point: DEFAULT_ENTRY_POINT,
        };
        let ci = desc.create_info();
        assert_eq!(ci.stage, vk::ShaderStageFlags::VERTEX);
        assert_eq!(unsafe { ci.name_as_c_str() }, Some(c"main"));
    }
}
