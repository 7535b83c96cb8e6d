//! # xtask - 开发辅助工具
//!
//! 提供本地质量门禁与开发辅助命令。
//!
//! ## 命令
//!
//! - `check-all`: 运行 fmt、clippy、test
//! - `cov-runtime`: 运行 lexi-runtime 覆盖率
//! - `cov-workspace`: 运行 workspace 覆盖率
//! - `payload-check`: 检查分析结果 JSON 文件（能否解析、分区是否为空）

use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use lexi_runtime::{AnalysisEnvelope, SectionKey};
use walkdir::WalkDir;

fn run(step: &str, cmd: &mut Command) -> anyhow::Result<()> {
    eprintln!("\n==> {step}");
    let status = cmd.status()?;
    if !status.success() {
        anyhow::bail!("{step} failed with {status}");
    }
    Ok(())
}

fn ensure_cargo_llvm_cov_available() -> anyhow::Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.args(["llvm-cov", "--version"]);
    match cmd.status() {
        Ok(s) if s.success() => Ok(()),
        _ => anyhow::bail!(
            "cargo llvm-cov 不可用。\n\
请先安装：\n\
  - cargo install cargo-llvm-cov\n\
  - rustup component add llvm-tools-preview\n\
然后重试。"
        ),
    }
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("xtask error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let sub = args.next().unwrap_or_else(|| "help".to_string());

    match sub.as_str() {
        "check-all" => {
            let mut fmt = Command::new("cargo");
            fmt.args(["fmt", "--all", "--", "--check"]);
            run("cargo fmt --all -- --check", &mut fmt)?;

            let mut clippy = Command::new("cargo");
            clippy.args(["clippy", "--workspace", "--all-targets"]);
            run("cargo clippy --workspace --all-targets", &mut clippy)?;

            let mut test = Command::new("cargo");
            test.args(["test", "--workspace"]);
            run("cargo test --workspace", &mut test)?;
        }
        "cov-runtime" => {
            ensure_cargo_llvm_cov_available()?;

            let mut cov = Command::new("cargo");
            cov.args(["llvm-cov", "-p", "lexi-runtime", "--html"]);
            run("cargo llvm-cov -p lexi-runtime --html", &mut cov)?;

            eprintln!("\nCoverage HTML: target/llvm-cov/html/index.html");
        }
        "cov-workspace" => {
            ensure_cargo_llvm_cov_available()?;

            let mut cov = Command::new("cargo");
            cov.args(["llvm-cov", "--workspace", "--exclude", "xtask", "--html"]);
            run(
                "cargo llvm-cov --workspace --exclude xtask --html",
                &mut cov,
            )?;

            eprintln!("\nCoverage HTML: target/llvm-cov/html/index.html");
        }
        "payload-check" => {
            let path = args.next();
            payload_check(path.as_deref())?;
        }
        "help" | "-h" | "--help" => {
            print_help();
        }
        other => anyhow::bail!("unknown xtask subcommand: {other}"),
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        r#"xtask - 开发辅助工具

USAGE:
  cargo xtask <command>

COMMANDS:
  check-all       运行 fmt、clippy、test 门禁检查
  cov-runtime     运行 lexi-runtime 覆盖率报告
  cov-workspace   运行 workspace 覆盖率报告
  payload-check   检查分析结果 JSON 文件

PAYLOAD-CHECK:
  cargo xtask payload-check [path]

  不带参数：检查 lexi-host/fixtures/ 下所有 .json 文件
  带路径参数：检查指定文件或目录

  检查内容：
    - JSON 语法与顶层结构
    - 没有任何可展示内容的结果
    - 形状不符、将降级为文本的分区
"#
    );
}

//=============================================================================
// payload-check 命令实现
//=============================================================================

/// 默认载荷目录（相对于 workspace root）
const DEFAULT_PAYLOAD_DIR: &str = "lexi-host/fixtures";

/// 载荷检查结果
#[derive(Default)]
struct PayloadCheckResult {
    /// 检查的文件数量
    files_checked: usize,
    /// 无法解析的文件数量
    errors: usize,
    /// 警告
    warnings: Vec<String>,
}

fn payload_check(path: Option<&str>) -> anyhow::Result<()> {
    let root = PathBuf::from(path.unwrap_or(DEFAULT_PAYLOAD_DIR));
    if !root.exists() {
        anyhow::bail!(
            "路径不存在: {}\n请在 workspace 根目录运行，或指定载荷路径",
            root.display()
        );
    }

    let files = collect_payload_files(&root)?;
    if files.is_empty() {
        eprintln!("未找到载荷文件（.json）");
        return Ok(());
    }

    eprintln!("==> 检查 {} 个载荷文件...\n", files.len());

    let mut result = PayloadCheckResult::default();
    for file in &files {
        check_payload_file(file, &mut result);
    }

    print_check_result(&result);

    if result.errors > 0 {
        anyhow::bail!("载荷检查发现错误");
    }
    Ok(())
}

fn collect_payload_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn check_payload_file(file: &Path, result: &mut PayloadCheckResult) {
    let id = file.display().to_string();
    result.files_checked += 1;

    let content = match std::fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[ERROR] {id}: 无法读取文件 - {e}");
            result.errors += 1;
            return;
        }
    };
    let value: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("[ERROR] {id}: {e}");
            result.errors += 1;
            return;
        }
    };
    let envelope = match AnalysisEnvelope::from_json_value(&value) {
        Ok(envelope) => envelope,
        Err(e) => {
            eprintln!("[ERROR] {id}: {e}");
            result.errors += 1;
            return;
        }
    };

    if envelope.result.is_empty() {
        result.warnings.push(format!("{id}: 没有任何可展示的内容"));
    }
    for key in SectionKey::ENTITIES {
        let expected = key.expected_shape();
        if let Some(section) = envelope.result.section(key)
            && section.shape() != Some(expected)
        {
            result
                .warnings
                .push(format!("{id}: 分区 {key} 期望 {expected:?}，将按文本展示"));
        }
    }

    let present: Vec<_> = envelope
        .result
        .present_entity_sections()
        .iter()
        .map(SectionKey::as_str)
        .collect();
    eprintln!(
        "[OK] {id}: 摘要 {} 条, 分区 [{}]",
        envelope.result.summary.len(),
        present.join(", ")
    );
}

fn print_check_result(result: &PayloadCheckResult) {
    eprintln!("─────────────────────────────────────────────────────");
    eprintln!("检查完成: {} 个文件", result.files_checked);
    eprintln!();

    for warning in &result.warnings {
        eprintln!("[WARN] {warning}");
    }

    eprintln!();
    if result.errors > 0 {
        eprintln!("❌ {} 个错误, {} 个警告", result.errors, result.warnings.len());
    } else if !result.warnings.is_empty() {
        eprintln!("⚠️  0 个错误, {} 个警告", result.warnings.len());
    } else {
        eprintln!("✅ 检查通过，无错误");
    }
}
