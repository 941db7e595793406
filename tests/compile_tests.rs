mod common;

use common::{Project, WASM_MAGIC};
use islet::driver::module_id;
use islet::PipelineError;
use std::path::Path;
use std::time::Duration;

const SIMPLE: &str = "import \"fmt\"\nfmt.Println(\"hi\")";

#[tokio::test]
async fn test_simple_script_compiles() {
    let project = Project::new();
    let module = project.compiler.compile(SIMPLE, Path::new("pages/index.page")).await.unwrap();

    assert_eq!(module.hash.len(), 8);
    assert!(module.hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(
        module.wasm_path,
        project.config.wasm_cache_dir().join(format!("script-{}.wasm", module.hash))
    );
    let bytes = std::fs::read(&module.wasm_path).unwrap();
    assert!(bytes.starts_with(WASM_MAGIC));
    assert_eq!(project.toolchain.compiles(), 1);
    assert_eq!(project.leftover_build_dirs(), 0);
}

#[tokio::test]
async fn test_user_entry_preserved() {
    let project = Project::new();
    let script = "import \"fmt\"\nfunc main() {\n\tfmt.Println(\"mine\")\n\tselect {}\n}";

    let program = project.compiler.prepare(script, Path::new("index.page"));
    assert!(program.user_entry);
    assert_eq!(program.source.matches("func main()").count(), 1);
    assert!(!program.source.contains("__isletRun"));

    project.compiler.compile(script, Path::new("index.page")).await.unwrap();
}

#[tokio::test]
async fn test_cache_hit_skips_compiler() {
    let project = Project::new();
    let first = project.compiler.compile(SIMPLE, Path::new("a.page")).await.unwrap();
    let second = project.compiler.compile(SIMPLE, Path::new("b.page")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(project.toolchain.compiles(), 1);
}

#[tokio::test]
async fn test_distinct_scripts_distinct_artifacts() {
    let project = Project::new();
    let a = project.compiler.compile("println(1)", Path::new("index.page")).await.unwrap();
    let b = project.compiler.compile("println(2)", Path::new("index.page")).await.unwrap();

    assert_ne!(a.hash, b.hash);
    assert!(a.wasm_path.is_file());
    assert!(b.wasm_path.is_file());
    assert_eq!(project.compiler.cache().entries().unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_source_reports_compile_failure() {
    let project = Project::new();
    let err = project
        .compiler
        .compile("fmt.Println(\"oops)", Path::new("index.page"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Toolchain { .. }));
    assert!(err.to_string().contains("compile failed"));
    assert!(err.to_string().contains("newline in string"));
    assert!(project.compiler.cache().entries().unwrap().is_empty());
    assert_eq!(project.leftover_build_dirs(), 0);
}

#[tokio::test]
async fn test_missing_artifact_lists_build_dir() {
    let project = Project::with_toolchain(|stub| stub.skip_artifact = true);
    let err = project.compiler.compile("println(1)", Path::new("index.page")).await.unwrap_err();

    match err {
        PipelineError::MissingArtifact { output, files, .. } => {
            assert_eq!(output, "stub build ok\n");
            assert_eq!(files, vec!["go.mod", "main.go"]);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_concurrent_compiles_share_one_build() {
    let project = Project::with_toolchain(|stub| stub.delay = Duration::from_millis(200));
    let page = Path::new("index.page");

    let (a, b, c) = tokio::join!(
        project.compiler.compile(SIMPLE, page),
        project.compiler.compile(SIMPLE, page),
        project.compiler.compile(SIMPLE, page),
    );

    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
    assert_eq!(project.toolchain.compiles(), 1);
}

#[tokio::test]
async fn test_concurrent_failure_reaches_every_caller() {
    let project = Project::with_toolchain(|stub| stub.delay = Duration::from_millis(100));
    let page = Path::new("index.page");
    let bad = "fmt.Println(\"oops)";

    let (a, b) = tokio::join!(project.compiler.compile(bad, page), project.compiler.compile(bad, page));

    for err in [a.unwrap_err(), b.unwrap_err()] {
        assert!(matches!(err.root(), PipelineError::Toolchain { .. }));
    }
    assert_eq!(project.toolchain.compiles(), 1);
}

#[tokio::test]
async fn test_cancelled_build_cleans_up_and_retries() {
    let project = Project::with_toolchain(|stub| stub.delay = Duration::from_millis(500));
    let page = Path::new("index.page");

    let cancelled = tokio::time::timeout(Duration::from_millis(50), project.compiler.compile(SIMPLE, page)).await;
    assert!(cancelled.is_err());
    assert_eq!(project.leftover_build_dirs(), 0);
    assert!(project.compiler.cache().entries().unwrap().is_empty());

    let module = project.compiler.compile(SIMPLE, page).await.unwrap();
    assert!(module.wasm_path.is_file());
    assert_eq!(project.toolchain.compiles(), 2);
}

#[tokio::test]
async fn test_interop_program_keyed_by_page_name() {
    let project = Project::new();
    let script = "js.Global().Set(\"ready\", true)";
    let page = Path::new("pages/blog/post.page");

    assert_eq!(module_id(page), "post.page");
    let program = project.compiler.prepare(script, page);
    assert!(program.interop);
    assert!(program.source.contains("var __hmrModuleID = \"post.page\""));

    let module = project.compiler.compile(script, page).await.unwrap();
    let bytes = std::fs::read_to_string(&module.wasm_path).unwrap();
    assert!(bytes.contains("\"syscall/js\""));
}

#[tokio::test]
async fn test_small_backend_when_available() {
    let project = Project::with_toolchain(|stub| stub.small = true);
    let compiler = islet::Compiler::from_config(
        &islet::PipelineConfig { small_backend: true, ..project.config.clone() },
        project.toolchain.clone(),
    );
    assert_eq!(compiler.backend(), islet::Backend::Small);
    assert_eq!(project.compiler.backend(), islet::Backend::Standard);
}

#[tokio::test]
#[ignore = "needs the real compiler toolchain on PATH"]
async fn test_real_toolchain_compiles_simple_script() {
    let dir = tempfile::tempdir().unwrap();
    let config = islet::PipelineConfig {
        out_dir: dir.path().join("dist"),
        build_dir: dir.path().join("build"),
        ..islet::PipelineConfig::default()
    };
    let toolchain = std::sync::Arc::new(islet::ProcessToolchain::new(config.toolchain.clone()));
    let compiler = islet::Compiler::from_config(&config, toolchain);
    let module = compiler.compile(SIMPLE, Path::new("index.page")).await.unwrap();
    assert!(std::fs::read(&module.wasm_path).unwrap().starts_with(b"\0asm"));
}
