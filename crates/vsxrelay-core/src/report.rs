use std::fmt::{Display, Formatter};

use crate::error::Error;
use crate::extension::ExtensionRef;
use crate::operation::Operation;

/// How far an item got through its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Pending,
    Fetched,
    Transferred,
    Installed,
    Cleaned,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetched => "fetched",
            Self::Transferred => "transferred",
            Self::Installed => "installed",
            Self::Cleaned => "cleaned",
            Self::Failed => "failed",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one extension.
#[derive(Debug)]
pub struct ItemReport {
    pub extension: ExtensionRef,
    pub stage: Stage,
    /// What was done (or, in a dry run, what would have been done).
    pub steps: Vec<String>,
    pub error: Option<Error>,
}

impl ItemReport {
    pub fn new(extension: ExtensionRef) -> Self {
        Self {
            extension,
            stage: Stage::Pending,
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn advance(&mut self, stage: Stage, step: impl Into<String>) {
        self.stage = stage;
        self.steps.push(step.into());
    }

    /// Marks the item failed. An item fails at most once.
    pub fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.stage = Stage::Failed;
            self.error = Some(error);
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything a run did, item by item.
#[derive(Debug)]
pub struct RunSummary {
    pub operation: Operation,
    pub dry_run: bool,
    pub items: Vec<ItemReport>,
}

impl RunSummary {
    pub fn new(operation: Operation, dry_run: bool) -> Self {
        Self {
            operation,
            dry_run,
            items: Vec::new(),
        }
    }

    /// True when no item failed.
    pub fn is_success(&self) -> bool {
        self.items.iter().all(|item| !item.failed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|item| item.failed())
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| !item.failed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_is_recorded_once() {
        let mut item = ItemReport::new(ExtensionRef::new("a", "b"));
        item.advance(Stage::Fetched, "fetched");
        item.fail(Error::Download {
            extension: "a.b".into(),
            reason: "first".into(),
        });
        item.fail(Error::Download {
            extension: "a.b".into(),
            reason: "second".into(),
        });
        assert_eq!(item.stage, Stage::Failed);
        assert!(item.error.unwrap().to_string().contains("first"));
    }

    #[test]
    fn summary_success_and_failures() {
        let mut summary = RunSummary::new(Operation::Update, false);
        summary.items.push(ItemReport::new(ExtensionRef::new("a", "b")));
        assert!(summary.is_success());

        let mut failed = ItemReport::new(ExtensionRef::new("c", "d"));
        failed.fail(Error::NoExtensions("x".into()));
        summary.items.push(failed);
        assert!(!summary.is_success());
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(
            summary
                .failures()
                .map(|i| i.extension.id())
                .collect::<Vec<_>>(),
            vec!["c.d"]
        );
    }
}
