use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use tw_quest_kit::datatypes::TextEncoding;
use tw_quest_kit::io::{DefaultDocumentReader, DefaultDocumentWriter, DocumentReader};
use tw_quest_kit::{
    codec, diff, Category, Document, DocumentEditor, EntityKind, Filter, LanOptions, LoadOptions,
    QueryEntry, SUPPORTED_EXTENSIONS,
};

#[derive(Parser)]
#[command(name = "tw_quest_kit")]
#[command(about = "读取、比较和编辑 Two Worlds 的任务、对话和语言文件")]
#[command(version)]
struct Cli {
    /// 静默模式(仅输出错误)
    #[arg(long, global = true)]
    quiet: bool,

    /// 语言文件的值按 8 位代码页解码
    #[arg(long, global = true)]
    lan_8bit: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 显示文件格式、记录数量和诊断信息
    Info {
        input: PathBuf,
        /// 以 JSON 输出统计信息
        #[arg(long)]
        json: bool,
    },
    /// 按条件导出条目为 JSON
    Dump {
        input: PathBuf,
        /// 输出JSON文件路径(默认输出到标准输出)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 实体类型: translation, alias, dialog, quest, npc, location
        #[arg(long)]
        entity: Option<String>,
        /// 分类名称，如 Dialogs、"Quest Items"
        #[arg(long)]
        category: Option<String>,
        /// 键或值包含的文本(不区分大小写)
        #[arg(long)]
        contains: Option<String>,
        /// 键前缀
        #[arg(long)]
        prefix: Option<String>,
        /// 导出二进制序列化文件的字符串池摘要
        #[arg(long)]
        pool: bool,
    },
    /// 对比两个同类文件
    Diff {
        left: PathBuf,
        right: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// 解析后直接重建，检查输出是否与原文件逐字节一致
    Verify {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// 修改一个字段并保存
    Set {
        input: PathBuf,
        #[arg(long, default_value = "translation")]
        entity: String,
        #[arg(long)]
        key: String,
        #[arg(long, default_value = "value")]
        field: String,
        /// 新值；省略时把字段置空
        #[arg(long)]
        value: Option<String>,
        /// 输出路径(默认覆盖原文件)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 覆盖前不备份
        #[arg(long)]
        no_backup: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let reader = DefaultDocumentReader::new(load_options(&cli));
    match &cli.command {
        Command::Info { input, json } => handle_info(&reader, input, *json, cli.quiet),
        Command::Dump {
            input,
            output,
            entity,
            category,
            contains,
            prefix,
            pool,
        } => {
            let filter = build_filter(entity.as_deref(), category.as_deref(), contains, prefix)?;
            handle_dump(&reader, input, output.as_deref(), &filter, *pool, cli.quiet)
        }
        Command::Diff { left, right, json } => handle_diff(&reader, left, right, *json),
        Command::Verify { inputs } => handle_verify(&reader, inputs, cli.quiet),
        Command::Set {
            input,
            entity,
            key,
            field,
            value,
            output,
            no_backup,
        } => {
            let entity = parse_entity(entity)?;
            let output = output.as_deref().unwrap_or(input);
            handle_set(
                &reader,
                input,
                output,
                entity,
                key,
                field,
                value.as_deref(),
                !*no_backup,
                cli.quiet,
            )
        }
    }
}

/// 初始化日志：默认 info，静默模式只输出错误，`RUST_LOG` 优先
fn init_logging(quiet: bool) {
    let default_level = if quiet { "error" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn load_options(cli: &Cli) -> LoadOptions {
    let mut options = LoadOptions::default();
    if cli.lan_8bit {
        options.lan = LanOptions {
            value_encoding: TextEncoding::Windows1252,
            ..LanOptions::default()
        };
    }
    options
}

/// 验证输入文件
fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        bail!("输入文件不存在: {:?}", input);
    }
    let extension = input
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());
    if !SUPPORTED_EXTENSIONS.iter().any(|&ext| Some(ext) == extension.as_deref()) {
        debug!("{:?} 扩展名未知，按内容识别格式", input);
    }
    Ok(())
}

fn read(reader: &DefaultDocumentReader, input: &Path) -> Result<Document> {
    validate_input(input)?;
    let doc = reader
        .read(input)
        .with_context(|| format!("解析失败: {:?}", input))?;
    if !doc.warnings().is_empty() {
        warn!("{:?}: {} 条诊断信息", input, doc.warnings().len());
    }
    Ok(doc)
}

fn parse_entity(name: &str) -> Result<EntityKind> {
    EntityKind::from_name(name).with_context(|| format!("未知的实体类型: {}", name))
}

fn build_filter(
    entity: Option<&str>,
    category: Option<&str>,
    contains: &Option<String>,
    prefix: &Option<String>,
) -> Result<Filter> {
    let mut filter = Filter::new();
    if let Some(entity) = entity {
        filter = filter.entity(parse_entity(entity)?);
    }
    if let Some(category) = category {
        let category =
            Category::from_label(category).with_context(|| format!("未知的分类: {}", category))?;
        filter = filter.category(category);
    }
    if let Some(text) = contains {
        filter = filter.contains(text.as_str());
    }
    if let Some(prefix) = prefix {
        filter = filter.prefix(prefix.as_str());
    }
    Ok(filter)
}

/// 处理 info 命令
fn handle_info(reader: &DefaultDocumentReader, input: &Path, json: bool, quiet: bool) -> Result<()> {
    let doc = read(reader, input)?;
    let stats = doc.statistics();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("文件: {:?}", input);
    println!("格式: {}{}", doc.kind(), if doc.kind().is_writable() { "" } else { " (只读)" });
    if let Some(version) = doc.lan_version() {
        println!("版本: {}", version);
    }
    if let Some(header) = doc.stream_header() {
        println!("流头: {}", header);
    }

    println!("\n=== 记录统计 ===");
    println!("翻译: {}", stats.translations);
    println!("别名: {}", stats.aliases);
    println!("对话: {} (主角 {}, NPC {})", stats.dialogs, stats.hero_lines(), stats.npc_lines());
    println!("任务: {}", stats.quests);
    println!("NPC: {} (掉落物品 {})", stats.npcs, stats.drop_items);
    println!("地点: {}", stats.locations);

    if !stats.categories.is_empty() {
        println!("\n=== 翻译分类 ===");
        for (category, count) in &stats.categories {
            println!("{}: {}", category, count);
        }
    }

    if !quiet && !stats.trees.is_empty() {
        println!("\n=== 对话树 ===");
        for (tree, tree_stats) in &stats.trees {
            println!(
                "{}: {} 个节点, {} 个说话者, {} 个语音",
                tree, tree_stats.nodes, tree_stats.speakers, tree_stats.sound_cues
            );
        }
    }

    let dangling = doc.dangling_references();
    if !doc.warnings().is_empty() || !dangling.is_empty() {
        println!("\n=== 诊断信息 ===");
        for warning in doc.warnings().iter().chain(dangling.iter()) {
            println!("{}", warning);
        }
    }
    Ok(())
}

/// 处理 dump 命令
fn handle_dump(
    reader: &DefaultDocumentReader,
    input: &Path,
    output: Option<&Path>,
    filter: &Filter,
    pool: bool,
    quiet: bool,
) -> Result<()> {
    let doc = read(reader, input)?;

    let json = if pool {
        let summary = doc
            .string_pool()
            .map(|pool| pool.summary())
            .with_context(|| format!("{:?} 不是二进制序列化文件", input))?;
        serde_json::to_string_pretty(&summary)?
    } else {
        let entries: Vec<QueryEntry<'_>> = doc.query(filter).collect();
        if !quiet {
            info!("匹配 {} 个条目", entries.len());
        }
        serde_json::to_string_pretty(&entries)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("写入失败: {:?}", path))?;
            if !quiet {
                info!("结果已写入: {:?}", path);
            }
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// 处理 diff 命令
fn handle_diff(reader: &DefaultDocumentReader, left: &Path, right: &Path, json: bool) -> Result<()> {
    let a = read(reader, left)?;
    let b = read(reader, right)?;
    let differences = diff(&a, &b)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&differences)?);
    } else if differences.is_empty() {
        println!("两个文件内容一致");
    } else {
        for difference in &differences {
            println!("{}", difference);
        }
        println!("\n共 {} 处差异", differences.len());
    }
    Ok(())
}

/// 单个文件的校验结果
enum Verdict {
    Identical,
    ReadOnly,
    Mismatch { offset: usize, original: usize, rebuilt: usize },
}

fn verify_file(reader: &DefaultDocumentReader, input: &Path) -> Result<Verdict> {
    let original = std::fs::read(input).with_context(|| format!("读取失败: {:?}", input))?;
    let doc = read(reader, input)?;
    if !doc.kind().is_writable() {
        return Ok(Verdict::ReadOnly);
    }

    let rebuilt = codec::save(&doc).with_context(|| format!("重建失败: {:?}", input))?;
    if rebuilt == original {
        return Ok(Verdict::Identical);
    }
    let offset = original
        .iter()
        .zip(rebuilt.iter())
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| original.len().min(rebuilt.len()));
    Ok(Verdict::Mismatch {
        offset,
        original: original.len(),
        rebuilt: rebuilt.len(),
    })
}

/// 处理 verify 命令（多个文件并行）
fn handle_verify(reader: &DefaultDocumentReader, inputs: &[PathBuf], quiet: bool) -> Result<()> {
    let results: Vec<(&PathBuf, Result<Verdict>)> = inputs
        .par_iter()
        .map(|input| (input, verify_file(reader, input)))
        .collect();

    let mut failures = 0;
    for (input, result) in results {
        match result {
            Ok(Verdict::Identical) => {
                if !quiet {
                    println!("✓ {:?}", input);
                }
            }
            Ok(Verdict::ReadOnly) => {
                if !quiet {
                    println!("- {:?} (只读格式，已跳过)", input);
                }
            }
            Ok(Verdict::Mismatch { offset, original, rebuilt }) => {
                failures += 1;
                println!(
                    "✗ {:?}: 偏移 0x{:X} 处不一致 (原文件 {} 字节, 重建 {} 字节)",
                    input, offset, original, rebuilt
                );
            }
            Err(e) => {
                failures += 1;
                println!("✗ {:?}: {:#}", input, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} 个文件校验失败", failures);
    }
    Ok(())
}

/// 处理 set 命令
#[allow(clippy::too_many_arguments)]
fn handle_set(
    reader: &DefaultDocumentReader,
    input: &Path,
    output: &Path,
    entity: EntityKind,
    key: &str,
    field: &str,
    value: Option<&str>,
    backup: bool,
    quiet: bool,
) -> Result<()> {
    let doc = read(reader, input)?;
    let mut editor = DocumentEditor::new(doc);

    if !editor.set_field(entity, key, field, value)? {
        if !quiet {
            println!("{} {} 的 {} 未变化，不写入文件", entity, key, field);
        }
        return Ok(());
    }

    let writer = DefaultDocumentWriter { backup };
    editor
        .save(&writer, output)
        .with_context(|| format!("保存失败: {:?}", output))?;

    if !quiet {
        for change in editor.changes().iter() {
            println!("{}", change);
        }
        println!("已保存到: {:?}", output);
    }
    Ok(())
}
