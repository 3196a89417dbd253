// Compiles the demo's GLSL shaders to SPIR-V with the Vulkan SDK's glslc.
// Output goes to `Shaders/` at the workspace root, matching the default ShaderConfig.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [(&str, &str); 2] = [("shader.vert", "vert.spv"), ("shader.frag", "frag.spv")];

fn needs_compile(source: &Path, output: &Path) -> bool {
    match (std::fs::metadata(source), std::fs::metadata(output)) {
        (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
            (Ok(src), Ok(dst)) => src > dst,
            _ => true,
        },
        _ => true,
    }
}

fn main() {
    println!("cargo:rerun-if-changed=shaders");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if env::var_os("SKIP_SHADERS").is_some() {
        println!("cargo:warning=SKIP_SHADERS set, shader compilation skipped");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        println!("cargo:warning=VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        PathBuf::from(&vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        PathBuf::from(&vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        println!("cargo:warning=glslc not found at {}, shader compilation skipped", glslc.display());
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));
    let shader_dir = manifest_dir.join("shaders");
    let target_dir = manifest_dir.parent().unwrap_or(&manifest_dir).join("Shaders");

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        println!("cargo:warning=failed to create {}: {}", target_dir.display(), e);
        return;
    }

    for (source, output) in STAGES {
        let source = shader_dir.join(source);
        let output = target_dir.join(output);
        if !needs_compile(&source, &output) {
            continue;
        }

        match Command::new(&glslc).arg(&source).arg("-o").arg(&output).status() {
            Ok(status) if status.success() => {
                eprintln!("info: compiled {} -> {}", source.display(), output.display());
            }
            Ok(status) => {
                println!("cargo:warning=glslc failed for {} ({})", source.display(), status);
            }
            Err(e) => {
                println!("cargo:warning=failed to run glslc: {e}");
            }
        }
    }
}
