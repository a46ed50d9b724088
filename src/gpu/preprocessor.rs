use std::collections::HashSet;

use super::backend::SortKernel;
use super::shader_includes::{get_shader_include, kernel_source};
use crate::config::SorterConfig;
use crate::constants::generate_wgsl_constants;
use crate::error::{SortError, SortResult};

/// Simple WGSL preprocessor that handles #include directives
///
/// Includes resolve against the embedded sources in
/// [`shader_includes`](super::shader_includes). Each include is expanded once
/// per shader; repeats are skipped, which also breaks include cycles.
pub struct WgslPreprocessor {
    processed: HashSet<String>,
}

impl Default for WgslPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl WgslPreprocessor {
    pub fn new() -> Self {
        Self {
            processed: HashSet::new(),
        }
    }

    /// Process WGSL content named `shader`, resolving all #include directives
    pub fn process_content(&mut self, content: &str, shader: &str) -> SortResult<String> {
        let mut result = String::with_capacity(content.len());

        for line in content.lines() {
            let Some(include) = Self::parse_include_directive(line) else {
                result.push_str(line);
                result.push('\n');
                continue;
            };

            if !self.processed.insert(include.clone()) {
                result.push_str("// Skipped repeated include: ");
                result.push_str(&include);
                result.push('\n');
                continue;
            }

            let source = get_shader_include(&include).ok_or_else(|| SortError::ShaderPreprocess {
                shader: shader.to_string(),
                reason: format!("unknown include '{}'", include),
            })?;
            let processed = self.process_content(source, &include)?;

            result.push_str("// Begin include: ");
            result.push_str(&include);
            result.push('\n');
            result.push_str(&processed);
            result.push_str("// End include: ");
            result.push_str(&include);
            result.push('\n');
        }

        Ok(result)
    }

    /// Parse an #include directive from a line
    fn parse_include_directive(line: &str) -> Option<String> {
        let after_include = line.trim().strip_prefix("#include")?.trim();

        // Support both #include "file.wgsl" and #include <file.wgsl>
        after_include
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .or_else(|| {
                after_include
                    .strip_prefix('<')
                    .and_then(|rest| rest.strip_suffix('>'))
            })
            .map(str::to_string)
    }
}

/// Complete WGSL for one kernel: generated constants, then the kernel with
/// its includes expanded
pub fn build_kernel_source(kernel: SortKernel, config: &SorterConfig) -> SortResult<String> {
    let mut preprocessor = WgslPreprocessor::new();
    let body = preprocessor.process_content(kernel_source(kernel), kernel.label())?;

    let mut source = generate_wgsl_constants(config);
    source.push('\n');
    source.push_str(&body);
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_include_forms() {
        assert_eq!(
            WgslPreprocessor::parse_include_directive("#include \"a.wgsl\""),
            Some("a.wgsl".to_string())
        );
        assert_eq!(
            WgslPreprocessor::parse_include_directive("  #include <b.wgsl>"),
            Some("b.wgsl".to_string())
        );
        assert_eq!(WgslPreprocessor::parse_include_directive("#include c.wgsl"), None);
        assert_eq!(WgslPreprocessor::parse_include_directive("let x = 1u;"), None);
    }

    #[test]
    fn test_repeated_include_expands_once() {
        let mut preprocessor = WgslPreprocessor::new();
        let out = preprocessor
            .process_content("#include \"sweep_common.wgsl\"\n#include \"sweep_common.wgsl\"\n", "test")
            .unwrap();
        assert_eq!(out.matches("struct SweepParams").count(), 1);
        assert!(out.contains("// Skipped repeated include: sweep_common.wgsl"));
    }

    #[test]
    fn test_unknown_include_is_an_error() {
        let mut preprocessor = WgslPreprocessor::new();
        let err = preprocessor
            .process_content("#include \"missing.wgsl\"\n", "test")
            .unwrap_err();
        assert!(matches!(err, SortError::ShaderPreprocess { .. }));
    }

    #[test]
    fn test_kernel_sources_are_complete() {
        let config = SorterConfig::default();
        for kernel in SortKernel::ALL {
            let source = build_kernel_source(kernel, &config).unwrap();
            assert!(source.starts_with("// AUTO-GENERATED SORT CONSTANTS"));
            assert!(!source.contains("#include"), "{:?}", kernel);
            assert!(source.contains(&format!("fn {}(", kernel.entry_point())));
        }
        let down = build_kernel_source(SortKernel::DownSweep, &config).unwrap();
        assert_eq!(down.matches("fn workgroup_exclusive_scan").count(), 1);
    }
}
