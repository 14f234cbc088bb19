//! Shader module loading and caching for the shadow and cluster passes.
//!
//! Pipeline constructors look shaders up by name, so the set of compiled
//! modules is assembled once at startup from embedded WGSL sources, with an
//! optional on-disk directory for iterating on shaders without recompiling.

use log::{debug, info};
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use thiserror::Error;
use wgpu::{ShaderModuleDescriptor, ShaderSource};

/// Error types for shader loading operations.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read shader file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("shader '{name}' not found in library")]
    NotLoaded { name: String },

    #[error("no shader directory configured for file-based loading")]
    NoShaderDir,
}

/// Central registry for compiled shader modules.
pub struct ShaderLibrary {
    modules: HashMap<String, Arc<wgpu::ShaderModule>>,
    shader_dir: Option<PathBuf>,
}

impl ShaderLibrary {
    /// Create a new empty shader library.
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
            shader_dir: None,
        }
    }

    /// Set the directory to load .wgsl files from (development mode).
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    /// Compile a shader from a WGSL source string and cache it under `name`.
    pub fn load_from_source(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        source: &str,
    ) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        debug!("Loading shader '{}' from source", name);

        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some(name),
            source: ShaderSource::Wgsl(source.into()),
        });

        let arc_module = Arc::new(module);
        let replaced = self
            .modules
            .insert(name.to_string(), arc_module.clone())
            .is_some();

        if replaced {
            info!("Replaced shader '{}'", name);
        } else {
            info!("Loaded shader '{}'", name);
        }

        Ok(arc_module)
    }

    /// Load a shader from a file in the shader directory.
    pub fn load_from_file(
        &mut self,
        device: &wgpu::Device,
        name: &str,
        filename: &str,
    ) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        let shader_dir = self.shader_dir.as_ref().ok_or(ShaderError::NoShaderDir)?;
        let path = shader_dir.join(filename);

        debug!("Loading shader '{}' from file: {:?}", name, path);

        if !path.exists() {
            return Err(ShaderError::FileNotFound { path });
        }

        let source = std::fs::read_to_string(&path)?;
        self.load_from_source(device, name, &source)
    }

    /// Get a previously loaded shader by name.
    pub fn get(&self, name: &str) -> Option<Arc<wgpu::ShaderModule>> {
        self.modules.get(name).cloned()
    }

    /// Get a shader that must already be loaded, for pipeline construction.
    pub fn require(&self, name: &str) -> Result<Arc<wgpu::ShaderModule>, ShaderError> {
        self.get(name).ok_or_else(|| ShaderError::NotLoaded {
            name: name.to_string(),
        })
    }

    /// Number of loaded shaders.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the shader library is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_SHADER: &str = r#"
        @vertex
        fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
            return vec4<f32>(0.0, 0.0, 0.0, 1.0);
        }

        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return vec4<f32>(1.0, 0.0, 0.0, 1.0);
        }
    "#;

    fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await
                .ok()?;
            adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .ok()
        })
    }

    #[test]
    fn test_load_valid_shader_succeeds() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        let result = library.load_from_source(&device, "test", VALID_SHADER);
        assert!(result.is_ok());
    }

    #[test]
    fn test_cache_returns_same_module_for_same_name() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        library
            .load_from_source(&device, "shared", VALID_SHADER)
            .unwrap();

        let a = library.get("shared").unwrap();
        let b = library.get("shared").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_shader_library_starts_empty() {
        let library = ShaderLibrary::new();
        assert!(library.is_empty());
        assert_eq!(library.len(), 0);
    }

    #[test]
    fn test_require_missing_shader_returns_error() {
        let library = ShaderLibrary::new();
        assert!(matches!(
            library.require("missing"),
            Err(ShaderError::NotLoaded { .. })
        ));
    }

    #[test]
    fn test_load_from_file_without_shader_dir_returns_error() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        let result = library.load_from_file(&device, "test", "test.wgsl");
        assert!(matches!(result, Err(ShaderError::NoShaderDir)));
    }

    #[test]
    fn test_multiple_shaders_coexist() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        library
            .load_from_source(&device, "shader_a", VALID_SHADER)
            .unwrap();
        library
            .load_from_source(&device, "shader_b", VALID_SHADER)
            .unwrap();
        assert_eq!(library.len(), 2);
        assert!(library.get("shader_a").is_some());
        assert!(library.get("shader_b").is_some());
    }
}
