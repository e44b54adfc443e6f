use crossterm::style::Stylize;
use phrasal_feat::core::derivation::{DerivationArena, FeaturizerId, FeaturizerState};
use phrasal_feat::core::featurizer::{featurize_and_attach, DerivationFeaturizer};
use phrasal_feat::core::types::{FeatureValue, InputId, RuleApplication, Sequence};
use phrasal_feat::metrics::SentenceLevelMetric;
use phrasal_feat::persistence::{load_from_disk, save_to_disk, ResourceBundle};
use phrasal_feat::{FeatConfig, FeatError, RuleContext, SmoothedBleu};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: phrasal-feat [config.json] [resources.bin | source.classes [target.classes [inputs.domains]]]";

/// One scripted rule application of a FEATURIZE request.
#[derive(Deserialize)]
struct Step {
    position: usize,
    source: String,
    target: String,
    #[serde(default)]
    scores: Vec<f64>,
}

#[derive(Deserialize)]
struct FeaturizeRequest {
    #[serde(default)]
    input_id: InputId,
    source: String,
    steps: Vec<Step>,
}

#[derive(Serialize)]
struct StepReport {
    features: Vec<FeatureValue>,
    state: String,
}

enum Reply {
    Line(String),
    Skip,
    Exit,
}

struct Driver {
    resources: ResourceBundle,
    featurizer: RuleContext,
    metric: SmoothedBleu,
}

impl Driver {
    fn new(config: FeatConfig, resources: ResourceBundle) -> phrasal_feat::Result<Self> {
        let mut featurizer = RuleContext::new(
            FeaturizerId(0),
            config.rule_context,
            Arc::new(resources.classes.clone()),
        )?;
        if !resources.domains.is_empty() {
            featurizer = featurizer.with_domain_table(Arc::new(resources.domains.clone()));
        }
        let metric = SmoothedBleu::new(config.bleu)?;
        Ok(Self {
            resources,
            featurizer,
            metric,
        })
    }

    fn respond(&self, line: &str) -> Reply {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "BLEU" => match self.bleu(rest) {
                Some(score) => Reply::Line(format!("{score:.6}")),
                None => {
                    warn!("BLEU needs `ref ||| [ref ||| ...] candidate`");
                    Reply::Line("ERR".to_string())
                }
            },
            "FEATURIZE" => match serde_json::from_str::<FeaturizeRequest>(rest)
                .map_err(FeatError::from)
                .and_then(|request| self.featurize(request))
                .and_then(|reports| serde_json::to_string(&reports).map_err(FeatError::from))
            {
                Ok(json) => Reply::Line(json),
                Err(e) => {
                    error!(error = %e, "featurize request failed");
                    Reply::Line("ERR".to_string())
                }
            },
            "SNAPSHOT" => match save_to_disk(&self.resources, Path::new(rest.trim())) {
                Ok(()) => Reply::Line("OK".to_string()),
                Err(e) => {
                    error!(error = %e, "snapshot failed");
                    Reply::Line("ERR".to_string())
                }
            },
            "EXIT" => Reply::Exit,
            "" => Reply::Skip,
            other => {
                warn!(command = other, "unknown command");
                Reply::Line("ERR".to_string())
            }
        }
    }

    fn featurize(&self, request: FeaturizeRequest) -> phrasal_feat::Result<Vec<StepReport>> {
        let source = Sequence::from_text(&request.source);
        let input = self.featurizer.initialize(request.input_id, &source);
        let mut arena = DerivationArena::new(request.input_id, source.len());
        let mut parent = None;
        let mut reports = Vec::with_capacity(request.steps.len());
        for step in request.steps {
            let rule = RuleApplication::new(
                step.position,
                Sequence::from_text(&step.source),
                Sequence::from_text(&step.target),
                step.scores,
            );
            let id = arena.extend(parent, rule)?;
            let features = featurize_and_attach(&self.featurizer, &input, &mut arena, id)?;
            let state = match arena.get(id)?.state(self.featurizer.id()) {
                Some(FeaturizerState::RuleContext(state)) => state.context().join(" "),
                None => String::new(),
            };
            reports.push(StepReport { features, state });
            parent = Some(id);
        }
        Ok(reports)
    }

    /// `ref ||| [ref ||| ...] candidate`; the last segment is the candidate.
    fn bleu(&self, line: &str) -> Option<f64> {
        let mut parts: Vec<Sequence> = line.split("|||").map(Sequence::from_text).collect();
        let candidate = parts.pop()?;
        if parts.is_empty() {
            return None;
        }
        Some(self.metric.score(0, &parts, &candidate))
    }
}

/// A single `.bin` argument is a snapshot; otherwise the arguments are the
/// source classes, target classes and domain table as text.
fn load_resources(paths: &[String]) -> phrasal_feat::Result<ResourceBundle> {
    match paths {
        [snapshot] if snapshot.ends_with(".bin") => load_from_disk(Path::new(snapshot)),
        _ if paths.len() <= 3 => {
            let path = |i: usize| paths.get(i).map(|p| Path::new(p.as_str()));
            ResourceBundle::from_text_files(path(0), path(1), path(2))
        }
        _ => Err(FeatError::InvalidConfig(USAGE.to_string())),
    }
}

fn init_tracing() {
    let filter = std::env::var("PHRASAL_FEAT_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .compact()
        .init();
}

fn main() -> Result<(), FeatError> {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = match args.first() {
        Some(path) => FeatConfig::load(Path::new(path))?,
        None => FeatConfig::default(),
    };
    let resources = load_resources(args.get(1..).unwrap_or(&[]))?;
    let driver = Driver::new(config, resources)?;

    eprintln!("{}", "phrasal-feat ready. Commands: BLEU, FEATURIZE, SNAPSHOT, EXIT".bold());
    info!(
        order = driver.metric.config().order,
        domains = driver.resources.domains.len(),
        "driver started"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| FeatError::Io {
            path: "<stdin>".into(),
            source: e,
        })?;
        let output = match driver.respond(&line) {
            Reply::Line(output) => output,
            Reply::Skip => continue,
            Reply::Exit => break,
        };
        writeln!(stdout, "{output}")
            .and_then(|()| stdout.flush())
            .map_err(|e| FeatError::Io {
                path: "<stdout>".into(),
                source: e,
            })?;
    }
    info!("driver shutting down");
    Ok(())
}
