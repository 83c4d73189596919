use crate::domain::snapshot::{SnapshotError, StockSnapshot};
use crate::scoring::{fundamental, institutional, technical, Fired, ScoreKind, SubScore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    ShortTerm,
    LongTerm,
    Mixed,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 3] = [
        AnalysisType::ShortTerm,
        AnalysisType::LongTerm,
        AnalysisType::Mixed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisType::ShortTerm => "short_term",
            AnalysisType::LongTerm => "long_term",
            AnalysisType::Mixed => "mixed",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| anyhow::anyhow!("unknown analysis type: {s}"))
    }
}

/// One value per analysis type. Each type has its own entry; nothing is interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerAnalysis<T> {
    pub short_term: T,
    pub long_term: T,
    pub mixed: T,
}

impl<T> PerAnalysis<T> {
    pub fn get(&self, analysis_type: AnalysisType) -> &T {
        match analysis_type {
            AnalysisType::ShortTerm => &self.short_term,
            AnalysisType::LongTerm => &self.long_term,
            AnalysisType::Mixed => &self.mixed,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (AnalysisType, &T)> {
        [
            (AnalysisType::ShortTerm, &self.short_term),
            (AnalysisType::LongTerm, &self.long_term),
            (AnalysisType::Mixed, &self.mixed),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Weights {
    pub technical: f64,
    pub fundamental: f64,
    pub institutional: f64,
}

impl Weights {
    pub fn for_kind(&self, kind: ScoreKind) -> f64 {
        match kind {
            ScoreKind::Technical => self.technical,
            ScoreKind::Fundamental => self.fundamental,
            ScoreKind::Institutional => self.institutional,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "D")]
    D,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum weighted total for each grade; anything below `c` is a D.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradeBreakpoints {
    pub a_plus: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl GradeBreakpoints {
    pub fn grade(&self, weighted_total: f64) -> Grade {
        if weighted_total >= self.a_plus {
            Grade::APlus
        } else if weighted_total >= self.a {
            Grade::A
        } else if weighted_total >= self.b {
            Grade::B
        } else if weighted_total >= self.c {
            Grade::C
        } else {
            Grade::D
        }
    }

    pub fn is_descending(&self) -> bool {
        self.a_plus >= self.a && self.a >= self.b && self.b >= self.c
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScoringConfig {
    pub weights: PerAnalysis<Weights>,
    pub grades: PerAnalysis<GradeBreakpoints>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: PerAnalysis {
                short_term: Weights {
                    technical: 0.50,
                    fundamental: 0.20,
                    institutional: 0.30,
                },
                long_term: Weights {
                    technical: 0.20,
                    fundamental: 0.50,
                    institutional: 0.30,
                },
                mixed: Weights {
                    technical: 0.35,
                    fundamental: 0.35,
                    institutional: 0.30,
                },
            },
            grades: PerAnalysis {
                short_term: GradeBreakpoints {
                    a_plus: 8.5,
                    a: 7.0,
                    b: 5.5,
                    c: 4.0,
                },
                long_term: GradeBreakpoints {
                    a_plus: 8.0,
                    a: 6.5,
                    b: 5.0,
                    c: 3.5,
                },
                mixed: GradeBreakpoints {
                    a_plus: 8.2,
                    a: 6.8,
                    b: 5.2,
                    c: 3.8,
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub snapshot: StockSnapshot,
    pub technical: SubScore,
    pub fundamental: SubScore,
    pub institutional: SubScore,
    pub weighted_total: f64,
    pub grade: Grade,
    pub analysis_type: AnalysisType,
}

impl CompositeScore {
    pub fn subscore(&self, kind: ScoreKind) -> &SubScore {
        match kind {
            ScoreKind::Technical => &self.technical,
            ScoreKind::Fundamental => &self.fundamental,
            ScoreKind::Institutional => &self.institutional,
        }
    }

    /// Every rule that fired across the available sub-scores, in scorer order.
    pub fn fired(&self) -> impl Iterator<Item = &Fired> {
        ScoreKind::ALL
            .into_iter()
            .map(|kind| self.subscore(kind))
            .filter(|s| s.available)
            .flat_map(|s| s.signals.iter())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoredBatch {
    pub scores: Vec<CompositeScore>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
    config: ScoringConfig,
}

impl CompositeScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Runs the three sub-scorers and combines them. Fails only for malformed snapshots.
    pub fn score(
        &self,
        snapshot: &StockSnapshot,
        analysis_type: AnalysisType,
    ) -> Result<CompositeScore, SnapshotError> {
        snapshot.validate()?;

        let technical = technical::score(snapshot);
        let fundamental = fundamental::score(snapshot);
        let institutional = institutional::score(snapshot);

        for sub in [&technical, &fundamental, &institutional] {
            if !sub.available {
                tracing::warn!(
                    code = %snapshot.code,
                    kind = %sub.kind,
                    "sub-score data unavailable; contributes no score or weight"
                );
            }
        }

        Ok(self.combine(
            snapshot.clone(),
            technical,
            fundamental,
            institutional,
            analysis_type,
        ))
    }

    /// Weighted sum over available sub-scores only. Missing kinds lower the ceiling; their
    /// weight is not redistributed.
    pub fn combine(
        &self,
        snapshot: StockSnapshot,
        technical: SubScore,
        fundamental: SubScore,
        institutional: SubScore,
        analysis_type: AnalysisType,
    ) -> CompositeScore {
        let weights = self.config.weights.get(analysis_type);
        let weighted_total: f64 = [&technical, &fundamental, &institutional]
            .into_iter()
            .filter(|s| s.available)
            .map(|s| s.value * weights.for_kind(s.kind))
            .sum();
        let grade = self.config.grades.get(analysis_type).grade(weighted_total);

        CompositeScore {
            snapshot,
            technical,
            fundamental,
            institutional,
            weighted_total,
            grade,
            analysis_type,
        }
    }

    /// Scores a whole batch. Malformed snapshots are skipped and logged.
    pub fn score_batch(
        &self,
        snapshots: &[StockSnapshot],
        analysis_type: AnalysisType,
    ) -> ScoredBatch {
        let mut out = ScoredBatch {
            scores: Vec::with_capacity(snapshots.len()),
            skipped: 0,
        };

        for snapshot in snapshots {
            match self.score(snapshot, analysis_type) {
                Ok(score) => out.scores.push(score),
                Err(err) => {
                    out.skipped += 1;
                    tracing::warn!(code = %snapshot.code, error = %err, "skipping malformed snapshot");
                }
            }
        }

        tracing::debug!(
            %analysis_type,
            scored = out.scores.len(),
            skipped = out.skipped,
            "scored snapshot batch"
        );
        out
    }
}
