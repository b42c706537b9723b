use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::layout::Workspace;
use crate::pipeline::tools::ToolStages;
use crate::pipeline::{ChunkBounds, Stages};
use crate::progress::Spinner;

use super::report;

pub fn run(
    image: &str,
    tags: &[String],
    workdir: &Path,
    bounds: Option<ChunkBounds>,
    builder: &str,
    keep: bool,
    json: Option<&str>,
) -> Result<()> {
    fs::create_dir_all(workdir)
        .with_context(|| format!("Failed to create {}", workdir.display()))?;
    let ws = Workspace::new(workdir);

    let stages = ToolStages::new(image.to_string(), ws.clone(), builder.to_string());
    run_pipeline(&stages, tags, bounds.as_ref(), keep)?;

    report::run(workdir, tags, json)
}

/// Sequence the external stages for every tag, one stage at a time. Any
/// stage failure aborts the run before the analysis starts.
fn run_pipeline(
    stages: &dyn Stages,
    tags: &[String],
    bounds: Option<&ChunkBounds>,
    keep: bool,
) -> Result<()> {
    let total = tags.len();
    for (i, tag) in tags.iter().enumerate() {
        let n = i + 1;
        let spinner = Spinner::new(format!("[{n}/{total}] Fetching {tag}..."));
        stages
            .fetch(tag)
            .with_context(|| format!("Fetch stage failed for {tag}"))?;

        spinner.step(
            format!("[{n}/{total}] Fetched {tag}"),
            format!("[{n}/{total}] Unpacking {tag}..."),
        );
        stages
            .unpack(tag)
            .with_context(|| format!("Unpack stage failed for {tag}"))?;

        spinner.step(
            format!("[{n}/{total}] Unpacked {tag}"),
            format!("[{n}/{total}] Rebuilding {tag}..."),
        );
        stages
            .rebuild(tag, bounds)
            .with_context(|| format!("Rebuild stage failed for {tag}"))?;

        if !keep {
            stages
                .cleanup(tag)
                .with_context(|| format!("Cleanup stage failed for {tag}"))?;
        }
        spinner.finish(format!("[{n}/{total}] Rebuilt {tag}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records stage invocations instead of spawning external tools.
    #[derive(Default)]
    struct RecordingStages {
        calls: RefCell<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingStages {
        fn call(&self, stage: &str, tag: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("{stage} {tag}"));
            if self.fail_on == Some(stage) {
                anyhow::bail!("{stage} exploded");
            }
            Ok(())
        }
    }

    impl Stages for RecordingStages {
        fn fetch(&self, tag: &str) -> Result<()> {
            self.call("fetch", tag)
        }
        fn unpack(&self, tag: &str) -> Result<()> {
            self.call("unpack", tag)
        }
        fn rebuild(&self, tag: &str, _bounds: Option<&ChunkBounds>) -> Result<()> {
            self.call("rebuild", tag)
        }
        fn cleanup(&self, tag: &str) -> Result<()> {
            self.call("cleanup", tag)
        }
    }

    #[test]
    fn runs_stages_in_order_per_tag() {
        let stages = RecordingStages::default();
        let tags = vec!["t1".to_string(), "t2".to_string()];

        run_pipeline(&stages, &tags, None, false).unwrap();

        assert_eq!(
            *stages.calls.borrow(),
            vec![
                "fetch t1", "unpack t1", "rebuild t1", "cleanup t1",
                "fetch t2", "unpack t2", "rebuild t2", "cleanup t2",
            ]
        );
    }

    #[test]
    fn keep_skips_cleanup() {
        let stages = RecordingStages::default();
        let tags = vec!["t1".to_string()];

        run_pipeline(&stages, &tags, None, true).unwrap();

        assert_eq!(*stages.calls.borrow(), vec!["fetch t1", "unpack t1", "rebuild t1"]);
    }

    #[test]
    fn stage_failure_stops_the_pipeline() {
        let stages = RecordingStages {
            fail_on: Some("unpack"),
            ..Default::default()
        };
        let tags = vec!["t1".to_string(), "t2".to_string()];

        let err = run_pipeline(&stages, &tags, None, false).unwrap_err();
        assert!(err.to_string().contains("Unpack stage failed for t1"));
        assert_eq!(*stages.calls.borrow(), vec!["fetch t1", "unpack t1"]);
    }
}
