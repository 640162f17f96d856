//! # Report Sink
//!
//! Formats the events emitted by the archive engine - open archive, begin
//! entry, end entry with sizes, error, close with totals - as one of four
//! output flavours: human-readable text, JSON, CSV, or XML.
//!
//! The standard and CSV/XML flavours stream rows as events arrive. The JSON
//! flavour accumulates rows and prints one object at close, so the document
//! is well formed even if the run is cut short by an error.

use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::common::{Codec, APP_NAME};

/// Which operation the report narrates. Archive info has its own one-shot
/// entry point, [`print_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Create,
    Extract,
    List,
}

/// Percentage saved by compression; 0 when nothing was there to compress.
pub fn savings(compressed: u64, uncompressed: u64) -> f64 {
    if uncompressed == 0 {
        0.0
    } else {
        100.0 - (compressed as f64 / uncompressed as f64) * 100.0
    }
}

/// `stored` when compression did not change the size, else `deflated`.
fn method(compressed: u64, uncompressed: u64) -> &'static str {
    if compressed == uncompressed {
        "stored"
    } else {
        "deflated"
    }
}

/// The read-side counterpart of [`method`].
fn read_method(compressed: u64, uncompressed: u64) -> &'static str {
    if compressed == uncompressed {
        "extracting"
    } else {
        "inflating"
    }
}

/// Lowercase hex rendering of an entry's MD5 name digest.
pub fn digest_hex(digest: &[u8; 16]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

struct PendingEntry {
    name: String,
    uncompressed: u64,
    compressed: u64,
}

pub struct Report {
    format: OutputFormat,
    kind: ReportKind,
    verbose: bool,
    archive: String,
    files: Vec<Value>,
    pending: Option<PendingEntry>,
    error: Option<String>,
}

const CSV_HEADER: &str = "type_record,archive_name,files_name,files_name_digest,\
files_compression_method,files_uncompressed,files_compressed,files_savings,\
files_status,total_files,total_uncompressed,total_compressed,total_savings,\
total_errors,error_message";

impl Report {
    pub fn open(kind: ReportKind, format: OutputFormat, verbose: bool, archive: &str) -> Self {
        match format {
            OutputFormat::Standard => println!("{archive}:"),
            OutputFormat::Csv => {
                println!("{CSV_HEADER}");
                println!("archive,{archive}");
            }
            OutputFormat::Xml => {
                print!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><archive><archive>{archive}</archive>");
            }
            OutputFormat::Json => {}
        }
        Report {
            format,
            kind,
            verbose,
            archive: archive.to_string(),
            files: Vec::new(),
            pending: None,
            error: None,
        }
    }

    pub fn begin_section(&mut self) {
        match self.format {
            OutputFormat::Standard if self.kind == ReportKind::List => {
                if self.verbose {
                    println!("   Compressed  Uncompressed   Method Saving Name digest                      Name");
                    println!("------------- ------------- -------- ------ -------------------------------- ------------------------");
                } else {
                    println!(" Uncompressed Name");
                    println!("------------- ------------------------");
                }
            }
            OutputFormat::Xml => print!("<files>"),
            _ => {}
        }
    }

    pub fn end_section(&mut self) {
        match self.format {
            OutputFormat::Standard if self.kind == ReportKind::List => {
                if self.verbose {
                    println!("------------- ------------- -------- ------ -------------------------------- ------------------------");
                } else {
                    println!("------------- ------------------------");
                }
            }
            OutputFormat::Xml => print!("</files>"),
            _ => {}
        }
    }

    /// Announces an entry before its blocks start committing.
    pub fn begin_entry(&mut self, name: &str, uncompressed: u64, compressed: u64) {
        if self.format == OutputFormat::Standard {
            match self.kind {
                ReportKind::Create => print!("adding: {name}"),
                ReportKind::Extract => {
                    let verb = read_method(compressed, uncompressed);
                    if self.verbose {
                        print!("{verb}: {name} ({uncompressed} bytes)...");
                    } else {
                        print!("{verb}: {name}...");
                    }
                }
                ReportKind::List => {}
            }
        }
        self.pending = Some(PendingEntry { name: name.to_string(), uncompressed, compressed });
    }

    /// Closes a create-side entry once its last block has committed.
    pub fn end_entry_create(&mut self, uncompressed: u64, compressed: u64) {
        let pending = self.pending.take();
        let sav = savings(compressed, uncompressed);
        let m = method(compressed, uncompressed);
        match self.format {
            OutputFormat::Standard => {
                if self.verbose {
                    println!(" (in={uncompressed}) (out={compressed}) ({m} {sav:.2}%)");
                } else {
                    println!(" ({m} {sav:.2}%)");
                }
            }
            OutputFormat::Json => {
                let name = pending.map(|p| p.name).unwrap_or_default();
                self.files.push(if self.verbose {
                    json!({
                        "name": name,
                        "compression_method": m,
                        "uncompressed": uncompressed,
                        "compressed": compressed,
                        "savings": round2(sav),
                    })
                } else {
                    json!({ "name": name, "compression_method": m, "savings": round2(sav) })
                });
            }
            OutputFormat::Csv => {
                let name = pending.map(|p| p.name).unwrap_or_default();
                if self.verbose {
                    println!("files,,{name},,{m},{uncompressed},{compressed},{sav:.2}");
                } else {
                    println!("files,,{name},,{m},,,{sav:.2}");
                }
            }
            OutputFormat::Xml => {
                let name = pending.map(|p| p.name).unwrap_or_default();
                print!("<file><name>{name}</name><compression_method>{m}</compression_method>");
                if self.verbose {
                    print!("<uncompressed>{uncompressed}</uncompressed><compressed>{compressed}</compressed>");
                }
                print!("<savings>{sav:.2}</savings></file>");
            }
        }
    }

    /// Closes an extract-side entry with its outcome.
    pub fn end_entry_extract(&mut self, status: &str) {
        let pending = self.pending.take();
        match self.format {
            OutputFormat::Standard => println!(" {status}"),
            OutputFormat::Json => {
                if let Some(p) = pending {
                    let verb = read_method(p.compressed, p.uncompressed);
                    self.files.push(if self.verbose {
                        json!({
                            "name": p.name,
                            "compression_method": verb,
                            "uncompressed": p.uncompressed,
                            "status": status,
                        })
                    } else {
                        json!({ "name": p.name, "compression_method": verb, "status": status })
                    });
                }
            }
            OutputFormat::Csv => {
                if let Some(p) = pending {
                    let verb = read_method(p.compressed, p.uncompressed);
                    if self.verbose {
                        println!("files,,{},,{verb},{},,,{status}", p.name, p.uncompressed);
                    } else {
                        println!("files,,{},,{verb},,,,{status}", p.name);
                    }
                }
            }
            OutputFormat::Xml => {
                if let Some(p) = pending {
                    let verb = read_method(p.compressed, p.uncompressed);
                    print!("<file><name>{}</name><compression_method>{verb}</compression_method>", p.name);
                    if self.verbose {
                        print!("<uncompressed>{}</uncompressed>", p.uncompressed);
                    }
                    print!("<status>{status}</status></file>");
                }
            }
        }
    }

    /// Emits one listing row.
    pub fn list_row(&mut self, name: &str, digest: &[u8; 16], uncompressed: u64, compressed: u64) {
        let sav = savings(compressed, uncompressed);
        let m = method(compressed, uncompressed);
        match self.format {
            OutputFormat::Standard => {
                if self.verbose {
                    println!(
                        "{compressed:>13} {uncompressed:>13} {m:>8} {sav:>5.2}% {} {name}",
                        digest_hex(digest)
                    );
                } else {
                    println!("{uncompressed:>13} {name}");
                }
            }
            OutputFormat::Json => {
                self.files.push(if self.verbose {
                    json!({
                        "name": name,
                        "name_digest": digest_hex(digest),
                        "compression_method": m,
                        "uncompressed": uncompressed,
                        "compressed": compressed,
                        "savings": round2(sav),
                    })
                } else {
                    json!({ "name": name, "uncompressed": uncompressed })
                });
            }
            OutputFormat::Csv => {
                if self.verbose {
                    println!(
                        "files,,{name},{},{m},{uncompressed},{compressed},{sav:.2}",
                        digest_hex(digest)
                    );
                } else {
                    println!("files,,{name},,,{uncompressed}");
                }
            }
            OutputFormat::Xml => {
                if self.verbose {
                    print!(
                        "<file><name>{name}</name><name_digest>{}</name_digest>\
                         <compression_method>{m}</compression_method>\
                         <uncompressed>{uncompressed}</uncompressed>\
                         <compressed>{compressed}</compressed>\
                         <savings>{sav:.2}</savings></file>",
                        digest_hex(digest)
                    );
                } else {
                    print!("<file><name>{name}</name><uncompressed>{uncompressed}</uncompressed></file>");
                }
            }
        }
    }

    /// Reports an error inside an otherwise well-formed document.
    pub fn error(&mut self, message: &str) {
        match self.format {
            OutputFormat::Standard => println!("{APP_NAME}: {message}"),
            OutputFormat::Json => self.error = Some(message.to_string()),
            OutputFormat::Csv => println!("error,,,,,,,,,,,,,,\"{message}\""),
            OutputFormat::Xml => print!("<error>{message}</error>"),
        }
    }

    /// Finishes a create report with the file-group totals (manifest excluded).
    pub fn close_create(self, files: u32, uncompressed: u64, compressed: u64) {
        let sav = savings(compressed, uncompressed);
        match self.format {
            OutputFormat::Standard => {
                println!("{files} files");
                println!("total uncompressed={uncompressed} -> compressed={compressed} ({sav:.2}% savings)");
            }
            OutputFormat::Json => {
                let mut doc = json!({
                    "archive": self.archive,
                    "files": self.files,
                    "totals": {
                        "files": files,
                        "uncompressed": uncompressed,
                        "compressed": compressed,
                        "savings": round2(sav),
                    },
                });
                if let Some(err) = self.error {
                    doc["error"] = json!(err);
                }
                println!("{doc}");
            }
            OutputFormat::Csv => {
                println!("totals,,,,,,,,,{files},{uncompressed},{compressed},{sav:.2}");
            }
            OutputFormat::Xml => {
                print!(
                    "<totals><files>{files}</files><uncompressed>{uncompressed}</uncompressed>\
                     <compressed>{compressed}</compressed><savings>{sav:.2}</savings></totals>"
                );
                println!("</archive>");
            }
        }
    }

    /// Finishes an extract report.
    pub fn close_extract(self, files: u64, bytes: u64, errors: u64) {
        match self.format {
            OutputFormat::Standard => {
                println!("{files} files");
                println!("bytes={bytes} errors={errors}");
            }
            OutputFormat::Json => {
                let mut doc = json!({
                    "archive": self.archive,
                    "files": self.files,
                    "totals": { "files": files, "uncompressed": bytes, "errors": errors },
                });
                if let Some(err) = self.error {
                    doc["error"] = json!(err);
                }
                println!("{doc}");
            }
            OutputFormat::Csv => println!("totals,,,,,,,,,{files},{bytes},,,{errors}"),
            OutputFormat::Xml => {
                print!(
                    "<totals><files>{files}</files><uncompressed>{bytes}</uncompressed>\
                     <errors>{errors}</errors></totals>"
                );
                println!("</archive>");
            }
        }
    }

    /// Finishes a list report.
    pub fn close_list(self, files: u32) {
        match self.format {
            OutputFormat::Standard => println!("{files} files"),
            OutputFormat::Json => {
                let mut doc = json!({
                    "archive": self.archive,
                    "files": self.files,
                    "total_files": files,
                });
                if let Some(err) = self.error {
                    doc["error"] = json!(err);
                }
                println!("{doc}");
            }
            OutputFormat::Csv => println!("totals,,,,,,,,,{files}"),
            OutputFormat::Xml => println!("</archive>"),
        }
    }
}

/// Summary data for the `info` operation.
pub struct ArchiveInfoReport {
    pub archive: String,
    pub version: (u16, u16),
    pub total_files: u32,
    pub block_size: u64,
    pub ignore_case: bool,
    pub absolute_paths: bool,
    pub manifest_uncompressed: u64,
    pub manifest_compressed: u64,
    pub manifest_codec: Codec,
    pub files_uncompressed: u64,
    pub files_compressed: u64,
    pub files_codec: Codec,
    pub physical_size: u64,
}

/// Renders the `info` summary in the chosen format.
pub fn print_info(format: OutputFormat, info: &ArchiveInfoReport) {
    let total_uncompressed = info.manifest_uncompressed + info.files_uncompressed;
    let total_compressed = info.manifest_compressed + info.files_compressed;
    let m_sav = savings(info.manifest_compressed, info.manifest_uncompressed);
    let f_sav = savings(info.files_compressed, info.files_uncompressed);
    let t_sav = savings(total_compressed, total_uncompressed);
    let m_method = method(info.manifest_compressed, info.manifest_uncompressed);
    let f_method = method(info.files_compressed, info.files_uncompressed);
    let t_method = method(total_compressed, total_uncompressed);
    let path_kind = if info.absolute_paths { "Absolute Paths" } else { "Relative Paths" };

    match format {
        OutputFormat::Standard => {
            let flags = if info.ignore_case {
                format!("{path_kind} | Case-Insensitive Path")
            } else {
                path_kind.to_string()
            };
            println!("archive         : {}", info.archive);
            println!("version         : {}.{}", info.version.0, info.version.1);
            println!("total files     : {}", info.total_files);
            println!("block size      : {} bytes", info.block_size);
            println!("archive flags   : {flags}");
            println!(
                "manifest        : {} -> {} bytes ({} - {m_method} {m_sav:.2}%)",
                info.manifest_uncompressed, info.manifest_compressed, info.manifest_codec
            );
            println!(
                "files           : {} -> {} bytes ({} - {f_method} {f_sav:.2}%)",
                info.files_uncompressed, info.files_compressed, info.files_codec
            );
            println!(
                "total           : {total_uncompressed} -> {total_compressed} bytes ({t_method} {t_sav:.2}%)"
            );
            println!("physical size   : {} bytes", info.physical_size);
        }
        OutputFormat::Json => {
            let mut flags = vec![path_kind];
            if info.ignore_case {
                flags.push("Case-Insensitive Path");
            }
            let doc = json!({
                "archive": info.archive,
                "version": format!("{}.{}", info.version.0, info.version.1),
                "total_files": info.total_files,
                "block_size": info.block_size,
                "archive_flags": flags,
                "manifest": {
                    "uncompressed": info.manifest_uncompressed,
                    "compressed": info.manifest_compressed,
                    "compression_type": info.manifest_codec.to_string(),
                    "compression_method": m_method,
                    "savings": round2(m_sav),
                },
                "files": {
                    "uncompressed": info.files_uncompressed,
                    "compressed": info.files_compressed,
                    "compression_type": info.files_codec.to_string(),
                    "compression_method": f_method,
                    "savings": round2(f_sav),
                },
                "totals": {
                    "uncompressed": total_uncompressed,
                    "compressed": total_compressed,
                    "compression_method": t_method,
                    "savings": round2(t_sav),
                },
                "physical_size": info.physical_size,
            });
            println!("{doc}");
        }
        OutputFormat::Csv => {
            let flags = if info.ignore_case {
                format!("{path_kind} | Case-Insensitive Path")
            } else {
                path_kind.to_string()
            };
            println!(
                "type,archive,version,total_files,block_size,archive_flags,\
                 manifest_uncompressed,manifest_compressed,manifest_compression_type,\
                 manifest_compression_method,manifest_savings,files_uncompressed,\
                 files_compressed,files_compression_type,files_compression_method,\
                 files_savings,totals_uncompressed,totals_compressed,\
                 totals_compression_method,totals_savings,physical_size"
            );
            println!(
                "totals,{},{}.{},{},{},\"{flags}\",{},{},\"{}\",\"{m_method}\",{m_sav:.2},{},{},\"{}\",\"{f_method}\",{f_sav:.2},{total_uncompressed},{total_compressed},\"{t_method}\",{t_sav:.2},{}",
                info.archive,
                info.version.0,
                info.version.1,
                info.total_files,
                info.block_size,
                info.manifest_uncompressed,
                info.manifest_compressed,
                info.manifest_codec,
                info.files_uncompressed,
                info.files_compressed,
                info.files_codec,
                info.physical_size
            );
        }
        OutputFormat::Xml => {
            let mut flags = format!("<flag>{path_kind}</flag>");
            if info.ignore_case {
                flags.push_str("<flag>Case-Insensitive Path</flag>");
            }
            println!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?><archive>\
                 <archive>{}</archive>\
                 <version>{}.{}</version>\
                 <total_files>{}</total_files>\
                 <block_size>{}</block_size>\
                 <archive_flags>{flags}</archive_flags>\
                 <manifest><uncompressed>{}</uncompressed><compressed>{}</compressed>\
                 <compression_type>{}</compression_type>\
                 <compression_method>{m_method}</compression_method>\
                 <savings>{m_sav:.2}</savings></manifest>\
                 <files><uncompressed>{}</uncompressed><compressed>{}</compressed>\
                 <compression_type>{}</compression_type>\
                 <compression_method>{f_method}</compression_method>\
                 <savings>{f_sav:.2}</savings></files>\
                 <totals><uncompressed>{total_uncompressed}</uncompressed>\
                 <compressed>{total_compressed}</compressed>\
                 <compression_method>{t_method}</compression_method>\
                 <savings>{t_sav:.2}</savings></totals>\
                 <physical_size>{}</physical_size></archive>",
                info.archive,
                info.version.0,
                info.version.1,
                info.total_files,
                info.block_size,
                info.manifest_uncompressed,
                info.manifest_compressed,
                info.manifest_codec,
                info.files_uncompressed,
                info.files_compressed,
                info.files_codec,
                info.physical_size
            );
        }
    }
}
