use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use serde::Serialize;

use crate::layout::{Layout, Workspace};
use crate::progress::Spinner;
use crate::stats;

/// The full analysis result: one row per layout, one metadata row per tag.
#[derive(Debug, Serialize)]
pub struct Report {
    pub layouts: Vec<LayoutReport>,
    pub metadata: Vec<MetadataReport>,
}

#[derive(Debug, Serialize)]
pub struct LayoutReport {
    pub layout: Layout,
    pub snapshots: usize,
    pub raw_bytes: u64,
    pub mashed_bytes: u64,
    pub saved_bytes: u64,
    pub avg_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct MetadataReport {
    pub tag: String,
    pub metadata_bytes: u64,
}

pub fn run(workdir: &Path, tags: &[String], json: Option<&str>) -> Result<()> {
    let ws = Workspace::new(workdir);

    let spinner = Spinner::new("Scanning blob directories...");
    let report = analyze(&ws, tags)?;
    spinner.finish(format!("Analyzed {} snapshots", tags.len()));

    emit(&report, json)
}

/// Run the three core operations over an already-populated workspace:
/// build the occurrence tables, collapse them into per-layout statistics,
/// then compute every snapshot's metadata size.
pub fn analyze(ws: &Workspace, tags: &[String]) -> Result<Report> {
    anyhow::ensure!(!tags.is_empty(), "No tags to analyze");

    let mut layouts = Vec::new();
    for layout in Layout::ALL {
        let table = stats::build_occurrence_table(ws, layout, tags)?;
        let s = table.stats();
        layouts.push(LayoutReport {
            layout,
            snapshots: tags.len(),
            raw_bytes: s.raw,
            mashed_bytes: s.mashed(),
            saved_bytes: s.saved,
            avg_bytes: s.raw / tags.len() as u64,
        });
    }

    let mut metadata = Vec::new();
    for tag in tags {
        metadata.push(MetadataReport {
            tag: tag.clone(),
            metadata_bytes: stats::metadata_size(ws, tag)?,
        });
    }

    Ok(Report { layouts, metadata })
}

fn emit(report: &Report, json: Option<&str>) -> Result<()> {
    if let Some(dest) = json {
        let output = serde_json::to_string_pretty(report)?;
        if dest == "-" {
            println!("{output}");
        } else {
            fs::write(dest, &output)
                .with_context(|| format!("Failed to write JSON to {dest}"))?;
            eprintln!("{} Wrote {dest}", "✔".green());
        }
    } else {
        print_report(report);
    }
    Ok(())
}

fn print_report(report: &Report) {
    for l in &report.layouts {
        println!("=== {} layout ===", l.layout);
        println!("  snapshots: {}", l.snapshots);
        println!("  total size: {:.2} MB", mb(l.raw_bytes));
        println!("  average size: {:.2} MB", mb(l.avg_bytes));
        println!("  mashed-together size: {:.2} MB", mb(l.mashed_bytes));
        println!("  saved: {:.2} MB", mb(l.saved_bytes));
        println!();
    }

    println!("=== metadata ===");
    for m in &report.metadata {
        println!("  {}: {:.2} MB", m.tag, mb(m.metadata_bytes));
    }
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
