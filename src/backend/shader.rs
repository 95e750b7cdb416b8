// Shader loading
//
// Vulkan consumes SPIR-V bytecode directly. Shader files are read whole at
// startup, checked for a SPIR-V header, and wrapped in short-lived modules
// that only need to live until the pipeline has been built.

use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanDevice;
use crate::error::{RendererError, Result, Stage, VkResultExt};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Magic, version, generator, bound, schema
const SPIRV_HEADER_WORDS: usize = 5;

/// Read a shader binary in full
pub fn read_shader_file(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| RendererError::ShaderFile {
        path: path.to_path_buf(),
        source,
    })?;

    log::debug!("Read {} bytes of shader code from {:?}", bytes.len(), path);
    Ok(bytes)
}

/// SPIR-V words, validated and in host byte order
#[derive(Debug)]
pub struct ShaderCode {
    words: Vec<u32>,
}

impl ShaderCode {
    /// Reinterpret raw bytes as SPIR-V.
    ///
    /// Rejects anything that is empty, not a whole number of words, or lacks
    /// the SPIR-V magic number. Byte-swapped modules are accepted and fixed up.
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(RendererError::PipelineCreation(format!(
                "{} shader is empty",
                name
            )));
        }

        // read_spv handles alignment and endianness for us
        let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| {
            RendererError::PipelineCreation(format!("{} shader is not SPIR-V: {}", name, e))
        })?;

        if words.len() < SPIRV_HEADER_WORDS {
            return Err(RendererError::PipelineCreation(format!(
                "{} shader is truncated ({} bytes)",
                name,
                bytes.len()
            )));
        }

        if words[0] != SPIRV_MAGIC {
            return Err(RendererError::PipelineCreation(format!(
                "{} shader has bad magic number {:#010x}",
                name, words[0]
            )));
        }

        Ok(Self { words })
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

/// Shader module destroyed as soon as it goes out of scope
pub struct ShaderModule<'a> {
    pub module: vk::ShaderModule,
    device: &'a VulkanDevice,
}

impl<'a> ShaderModule<'a> {
    pub fn new(device: &'a VulkanDevice, code: &ShaderCode) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code.words());

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .stage(Stage::ShaderModule)?;

        Ok(Self { module, device })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: u32) -> Vec<u8> {
        [magic, 0x0001_0000, 0, 8, 0]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }

    fn expect_pipeline_error(result: Result<ShaderCode>, needle: &str) {
        match result {
            Err(RendererError::PipelineCreation(message)) => {
                assert!(message.contains(needle), "unexpected message: {}", message)
            }
            other => panic!("expected PipelineCreation, got {:?}", other),
        }
    }

    #[test]
    fn accepts_minimal_module() {
        let code = ShaderCode::from_bytes("vertex", &header(SPIRV_MAGIC)).unwrap();
        assert_eq!(code.words().len(), SPIRV_HEADER_WORDS);
        assert_eq!(code.words()[0], SPIRV_MAGIC);
    }

    #[test]
    fn accepts_byte_swapped_module() {
        let swapped: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]
            .iter()
            .flat_map(|word| word.to_be_bytes())
            .collect();

        let code = ShaderCode::from_bytes("vertex", &swapped).unwrap();
        assert_eq!(code.words()[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_empty_bytes() {
        expect_pipeline_error(ShaderCode::from_bytes("fragment", &[]), "fragment shader is empty");
    }

    #[test]
    fn rejects_partial_words() {
        let mut bytes = header(SPIRV_MAGIC);
        bytes.push(0);
        expect_pipeline_error(ShaderCode::from_bytes("vertex", &bytes), "not SPIR-V");
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = SPIRV_MAGIC.to_le_bytes();
        expect_pipeline_error(ShaderCode::from_bytes("vertex", &bytes), "truncated");
    }

    #[test]
    fn rejects_wrong_magic() {
        expect_pipeline_error(ShaderCode::from_bytes("vertex", &header(0xdead_beef)), "magic");
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let path = Path::new("shaders/does-not-exist.spv");
        match read_shader_file(path) {
            Err(RendererError::ShaderFile { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected ShaderFile error, got {:?}", other),
        }
    }

    #[test]
    fn reads_whole_file() {
        let path = std::env::temp_dir().join(format!("triangle-shader-{}.spv", std::process::id()));
        std::fs::write(&path, header(SPIRV_MAGIC)).unwrap();

        let bytes = read_shader_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(bytes, header(SPIRV_MAGIC));
    }
}
