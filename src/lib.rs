pub mod codec;
pub mod datatypes;
pub mod diff;
pub mod editor;
pub mod idx;
pub mod io;
pub mod lan;
pub mod model;
pub mod qtx;
pub mod shf;
pub mod utils;

// 重新导出主要结构
pub use codec::{detect, load, load_with, save, sniff, LoadOptions};
pub use diff::{diff, ChangeKind, Difference, FieldChange};
pub use editor::{ChangeLog, DocumentEditor, FieldEdit};
pub use io::{DefaultDocumentReader, DefaultDocumentWriter, DocumentReader, DocumentWriter};
pub use lan::LanOptions;
pub use model::{
    Alias, Capabilities, Category, DialogEntry, DialogFlags, Document, Entity, EntityKind, Filter,
    FormatKind, Location, Npc, Quest, QueryEntry, Statistics, Support, Tracked, Translation,
};
pub use qtx::QtxOptions;
pub use utils::{CodecError, SourceLocation, Warning};

// 常量定义
pub const SUPPORTED_EXTENSIONS: &[&str] = &["lan", "idx", "qtx", "shf"];
