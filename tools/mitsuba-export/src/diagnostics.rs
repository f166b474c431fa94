//! Non-fatal conversion warnings
//!
//! Every stage gets a [`WarningSink`] and sends warnings into it. Stages may
//! run on rayon workers, so the sink is a channel sender; the driver drains
//! the [`WarningCollector`] once all stages have finished and sorts the
//! result by `(stage, item)` so the report order does not depend on thread
//! scheduling.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use serde::Serialize;

/// Pipeline stage that raised a warning, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Read,
    Normalize,
    Map,
    Serialize,
    Emit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Read => "read",
            Stage::Normalize => "normalize",
            Stage::Map => "map",
            Stage::Serialize => "serialize",
            Stage::Emit => "emit",
        };
        f.write_str(name)
    }
}

/// Kind of scene item a warning is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Asset,
    Node,
    Mesh,
    Material,
    Texture,
    Camera,
    Light,
}

/// The item a warning is about: kind, source index, and name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub index: usize,
    pub name: String,
}

impl Subject {
    pub fn asset() -> Self {
        Self {
            kind: SubjectKind::Asset,
            index: 0,
            name: String::new(),
        }
    }

    pub fn new(kind: SubjectKind, index: usize, name: impl Into<String>) -> Self {
        Self {
            kind,
            index,
            name: name.into(),
        }
    }

    pub fn node(index: usize, name: impl Into<String>) -> Self {
        Self::new(SubjectKind::Node, index, name)
    }

    pub fn mesh(index: usize, name: impl Into<String>) -> Self {
        Self::new(SubjectKind::Mesh, index, name)
    }

    pub fn material(index: usize, name: impl Into<String>) -> Self {
        Self::new(SubjectKind::Material, index, name)
    }

    pub fn texture(index: usize, name: impl Into<String>) -> Self {
        Self::new(SubjectKind::Texture, index, name)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SubjectKind::Asset => return f.write_str("asset"),
            SubjectKind::Node => "node",
            SubjectKind::Mesh => "mesh",
            SubjectKind::Material => "material",
            SubjectKind::Texture => "texture",
            SubjectKind::Camera => "camera",
            SubjectKind::Light => "light",
        };
        if self.name.is_empty() {
            write!(f, "{} #{}", kind, self.index)
        } else {
            write!(f, "{} '{}'", kind, self.name)
        }
    }
}

/// A recorded degradation: dropped feature, approximated material, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub stage: Stage,
    pub asset: PathBuf,
    pub subject: Subject,
    /// Short machine-friendly feature name, e.g. `KHR_materials_clearcoat`
    pub feature: Option<String>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}: {}",
            self.stage,
            self.asset.display(),
            self.subject,
            self.message
        )
    }
}

/// Sending half, cloned or borrowed by every stage
#[derive(Debug, Clone)]
pub struct WarningSink {
    asset: Arc<PathBuf>,
    tx: Sender<Warning>,
}

impl WarningSink {
    pub fn warn(&self, stage: Stage, subject: Subject, message: impl Into<String>) {
        self.send(stage, subject, None, message.into());
    }

    /// Record a feature that was recognized but not carried over
    pub fn dropped(
        &self,
        stage: Stage,
        subject: Subject,
        feature: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.send(stage, subject, Some(feature.into()), message.into());
    }

    fn send(&self, stage: Stage, subject: Subject, feature: Option<String>, message: String) {
        let warning = Warning {
            stage,
            asset: self.asset.as_ref().clone(),
            subject,
            feature,
            message,
        };
        tracing::warn!("{}", warning);
        // Send only fails once the collector is gone.
        let _ = self.tx.send(warning);
    }
}

/// Receiving half, owned by the driver
#[derive(Debug)]
pub struct WarningCollector {
    rx: Receiver<Warning>,
}

impl WarningCollector {
    /// Drain everything sent so far, in deterministic order
    pub fn drain(&self) -> Vec<Warning> {
        let mut warnings: Vec<Warning> = self.rx.try_iter().collect();
        // Stable: warnings about one item keep their send order.
        warnings.sort_by(|a, b| {
            (a.stage, a.subject.kind, a.subject.index).cmp(&(b.stage, b.subject.kind, b.subject.index))
        });
        warnings
    }
}

/// Create a connected sink/collector pair for one asset
pub fn channel(asset: &Path) -> (WarningSink, WarningCollector) {
    let (tx, rx) = mpsc::channel();
    (
        WarningSink {
            asset: Arc::new(asset.to_path_buf()),
            tx,
        },
        WarningCollector { rx },
    )
}
