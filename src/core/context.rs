// File: src/core/context.rs
use crate::config::RuleContextConfig;
use crate::core::class_map::ClassMaps;
use crate::core::coverage::CoverageSet;
use crate::core::derivation::{DerivationArena, DerivationId, FeaturizerId, FeaturizerState};
use crate::core::domain::DomainTable;
use crate::core::featurizer::{DerivationFeaturizer, Featurization};
use crate::core::types::{FeatureValue, InputId, RuleApplication, Sequence, Token};
use crate::error::{FeatError, Result};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// The class context a rule-context derivation carries forward: the classes
/// of the most recently covered source positions, in source order.
///
/// Equal states give equal features on the next extension. They do not
/// guarantee equal states afterwards: a short span walks the ancestor chain,
/// which may differ between derivations with equal states and coverage, so
/// recombining on this state is approximate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextState {
    context: Sequence,
}

impl ContextState {
    pub fn new(context: Sequence) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Sequence {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.context.len()
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

/// Per-input data: the source sentence mapped to classes, and its domain.
#[derive(Debug, Clone)]
pub struct RuleContextInput {
    pub input_id: InputId,
    pub source_classes: Sequence,
    pub domain: Option<String>,
}

/// Rule identity conditioned on the class context of previously translated
/// source words.
pub struct RuleContext {
    id: FeaturizerId,
    config: RuleContextConfig,
    classes: Arc<ClassMaps>,
    domains: Option<Arc<DomainTable>>,
}

impl RuleContext {
    /// Builds the featurizer, loading the domain file if one is configured.
    /// Class-based features need a target class map.
    pub fn new(id: FeaturizerId, config: RuleContextConfig, classes: Arc<ClassMaps>) -> Result<Self> {
        config.validate()?;
        if config.add_class_based && classes.target.is_empty() {
            return Err(FeatError::InvalidConfig(
                "add_class_based needs a non-empty target class map".to_string(),
            ));
        }
        if classes.source.is_empty() {
            warn!(featurizer = id.0, "source class map is empty; every context class is <unk>");
        }
        let domains = match &config.domain_file {
            Some(path) => Some(Arc::new(DomainTable::load(path)?)),
            None => None,
        };
        info!(
            featurizer = id.0,
            lexicalized = config.add_lexicalized,
            class_based = config.add_class_based,
            context_length = config.context_length,
            domains = domains.is_some(),
            "rule context featurizer ready"
        );
        Ok(Self {
            id,
            config,
            classes,
            domains,
        })
    }

    /// Uses an already loaded domain table instead of `config.domain_file`.
    pub fn with_domain_table(mut self, domains: Arc<DomainTable>) -> Self {
        self.domains = Some(domains);
        self
    }

    pub fn config(&self) -> &RuleContextConfig {
        &self.config
    }

    /// True when the rule was seen often enough for lexicalized features.
    /// Rules without the count slot (unknown-word rules) never pass.
    pub fn passes_count_gate(&self, rule: &RuleApplication) -> bool {
        let Some(index) = self.config.count_feature_index else {
            return true;
        };
        match rule.scores.get(index) {
            Some(log_count) => log_count.exp().round() > self.config.lexical_cutoff as f64,
            None => false,
        }
    }

    fn prior_context(&self, arena: &DerivationArena, parent: Option<DerivationId>) -> Result<Sequence> {
        let Some(parent) = parent else {
            return Ok(Sequence::new(vec![Token::start()]));
        };
        match arena.get(parent)?.state(self.id) {
            Some(FeaturizerState::RuleContext(state)) => Ok(state.context.clone()),
            None => Err(FeatError::contract(format!(
                "parent {parent} carries no rule-context state"
            ))),
        }
    }

    fn class_rule_key(&self, rule: &RuleApplication) -> String {
        format!(
            "{}>{}",
            self.classes.source.map_sequence(&rule.source).join("-"),
            self.classes.target.map_sequence(&rule.target).join("-")
        )
    }
}

impl DerivationFeaturizer for RuleContext {
    type Input = RuleContextInput;

    fn id(&self) -> FeaturizerId {
        self.id
    }

    fn initialize(&self, input_id: InputId, source: &Sequence) -> RuleContextInput {
        let domain = self
            .domains
            .as_ref()
            .and_then(|table| table.label(input_id))
            .map(str::to_string);
        debug!(input_id, source_len = source.len(), domain = ?domain, "rule context initialized");
        RuleContextInput {
            input_id,
            source_classes: self.classes.source.map_sequence(source),
            domain,
        }
    }

    fn featurize(
        &self,
        input: &RuleContextInput,
        arena: &DerivationArena,
        derivation: DerivationId,
    ) -> Result<Featurization> {
        let record = arena.get(derivation)?;
        let rule = &record.rule;
        if rule.span_len() == 0 || rule.span_end() > input.source_classes.len() {
            return Err(FeatError::contract(format!(
                "span {:?} invalid for source of length {}",
                rule.span(),
                input.source_classes.len()
            )));
        }

        let context = self.prior_context(arena, record.parent)?.join("-");
        let mut keys = Vec::with_capacity(2);
        if self.config.add_lexicalized && self.passes_count_gate(rule) {
            keys.push(format!(
                "{}:{}|{}>{}",
                self.config.feature_prefix,
                context,
                rule.source.join("-"),
                rule.target.join("-")
            ));
        }
        if self.config.add_class_based {
            keys.push(format!(
                "{}:{}|{}",
                self.config.feature_prefix,
                context,
                self.class_rule_key(rule)
            ));
        }

        let mut features = Vec::with_capacity(keys.len() * 2);
        for key in keys {
            if let Some(domain) = &input.domain {
                let domain_key = format!("{key}-{domain}");
                features.push(FeatureValue::indicator(key));
                features.push(FeatureValue::indicator(domain_key));
            } else {
                features.push(FeatureValue::indicator(key));
            }
        }

        let state = ContextState::new(make_context(
            &input.source_classes,
            arena,
            derivation,
            self.config.context_length,
        )?);
        trace!(%derivation, features = features.len(), state = ?state.context, "rule context featurized");
        Ok(Featurization {
            features,
            state: FeaturizerState::RuleContext(state),
        })
    }
}

/// The `k` most recently covered source positions of `derivation`, mapped
/// through `classes`.
///
/// A span of at least `k` positions supplies the context by itself; shorter
/// spans fall back to [`walk_context`].
pub fn make_context(
    classes: &Sequence,
    arena: &DerivationArena,
    derivation: DerivationId,
    k: usize,
) -> Result<Sequence> {
    let rule = &arena.get(derivation)?.rule;
    if rule.span_len() >= k {
        let end = rule.span_end();
        return classes
            .subsequence(end - k..end)
            .ok_or_else(|| FeatError::contract(format!("span {:?} outside class sequence", rule.span())));
    }
    Ok(walk_context(classes, arena, derivation, k))
}

/// Collects positions walking back from `derivation` (latest position of each
/// step first) until `k` are gathered, then projects `classes` onto them.
/// Running out of ancestors prefixes the start marker.
pub fn walk_context(
    classes: &Sequence,
    arena: &DerivationArena,
    derivation: DerivationId,
    k: usize,
) -> Sequence {
    let mut coverage = CoverageSet::new();
    for step in arena.ancestors(derivation) {
        for pos in step.rule.span().rev() {
            coverage.insert(pos);
            if coverage.cardinality() == k {
                return classes.project(&coverage);
            }
        }
    }
    Sequence::new(vec![Token::start()]).concat(&classes.project(&coverage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::class_map::ClassMap;
    use crate::core::featurizer::featurize_and_attach;

    fn seq(text: &str) -> Sequence {
        Sequence::from_text(text)
    }

    fn classes() -> Arc<ClassMaps> {
        Arc::new(ClassMaps::new(
            ClassMap::from_pairs([("a", "A"), ("b", "B"), ("c", "C"), ("d", "D"), ("e", "E")]),
            ClassMap::from_pairs([("v", "V"), ("w", "W")]),
        ))
    }

    fn rule(pos: usize, src: &str, tgt: &str, scores: Vec<f64>) -> RuleApplication {
        RuleApplication::new(pos, seq(src), seq(tgt), scores)
    }

    fn state_of(arena: &DerivationArena, id: DerivationId, fid: FeaturizerId) -> Sequence {
        match arena.get(id).unwrap().state(fid) {
            Some(FeaturizerState::RuleContext(state)) => state.context().clone(),
            None => panic!("no state attached"),
        }
    }

    #[test]
    fn walks_back_over_non_contiguous_coverage() {
        let featurizer = RuleContext::new(FeaturizerId(0), RuleContextConfig::default(), classes()).unwrap();
        let input = featurizer.initialize(0, &seq("a b c d e"));
        assert_eq!(input.source_classes, seq("A B C D E"));
        let mut arena = DerivationArena::new(0, 5);

        let first = arena.extend(None, rule(2, "c d", "x", vec![])).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, first).unwrap();
        assert_eq!(state_of(&arena, first, featurizer.id()), seq("C D"));

        let second = arena.extend(Some(first), rule(4, "e", "y", vec![])).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, second).unwrap();
        assert_eq!(state_of(&arena, second, featurizer.id()), seq("D E"));

        let third = arena.extend(Some(second), rule(0, "a", "z", vec![])).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, third).unwrap();
        assert_eq!(state_of(&arena, third, featurizer.id()), seq("A E"));
    }

    #[test]
    fn sentence_start_pads_short_context() {
        let featurizer = RuleContext::new(FeaturizerId(0), RuleContextConfig::default(), classes()).unwrap();
        let input = featurizer.initialize(0, &seq("a b c"));
        let mut arena = DerivationArena::new(0, 3);
        let first = arena.extend(None, rule(1, "b", "x", vec![])).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, first).unwrap();
        assert_eq!(state_of(&arena, first, featurizer.id()), seq("<s> B"));
    }

    #[test]
    fn feature_key_uses_prior_context() {
        let featurizer = RuleContext::new(FeaturizerId(0), RuleContextConfig::default(), classes()).unwrap();
        let input = featurizer.initialize(0, &seq("a b c d e"));
        let mut arena = DerivationArena::new(0, 5);
        let first = arena.extend(None, rule(0, "a b", "v w", vec![])).unwrap();
        let features = featurize_and_attach(&featurizer, &input, &mut arena, first).unwrap();
        assert_eq!(features, vec![FeatureValue::indicator("RCTX:<s>|a-b>v-w".to_string())]);

        let second = arena.extend(Some(first), rule(2, "c", "v", vec![])).unwrap();
        let features = featurize_and_attach(&featurizer, &input, &mut arena, second).unwrap();
        assert_eq!(features[0].name, "RCTX:A-B|c>v");
    }

    #[test]
    fn class_based_feature_ignores_count_gate() {
        let config = RuleContextConfig {
            add_lexicalized: true,
            add_class_based: true,
            count_feature_index: Some(0),
            ..RuleContextConfig::default()
        };
        let featurizer = RuleContext::new(FeaturizerId(0), config, classes()).unwrap();
        let input = featurizer.initialize(0, &seq("a b q"));
        let mut arena = DerivationArena::new(0, 3);
        let first = arena.extend(None, rule(1, "b q", "w", vec![])).unwrap();
        let features = featurize_and_attach(&featurizer, &input, &mut arena, first).unwrap();
        let names: Vec<&str> = features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["RCTX:<s>|B-<unk>>W"]);
    }

    #[test]
    fn count_gate() {
        let config = RuleContextConfig {
            count_feature_index: Some(1),
            lexical_cutoff: 50,
            ..RuleContextConfig::default()
        };
        let featurizer = RuleContext::new(FeaturizerId(0), config, classes()).unwrap();
        let frequent = rule(0, "a", "v", vec![0.0, (60.0f64).ln()]);
        let rare = rule(0, "a", "v", vec![0.0, (50.0f64).ln()]);
        let unknown_word = rule(0, "a", "a", vec![0.0]);
        assert!(featurizer.passes_count_gate(&frequent));
        assert!(!featurizer.passes_count_gate(&rare));
        assert!(!featurizer.passes_count_gate(&unknown_word));

        let ungated = RuleContext::new(FeaturizerId(0), RuleContextConfig::default(), classes()).unwrap();
        assert!(ungated.passes_count_gate(&unknown_word));
    }

    #[test]
    fn domain_copies_every_feature() {
        let config = RuleContextConfig {
            add_class_based: true,
            ..RuleContextConfig::default()
        };
        let mut table = DomainTable::new();
        table.insert(7, "news", 0);
        let featurizer = RuleContext::new(FeaturizerId(0), config, classes())
            .unwrap()
            .with_domain_table(Arc::new(table));
        let input = featurizer.initialize(7, &seq("a b"));
        let mut arena = DerivationArena::new(7, 2);
        let first = arena.extend(None, rule(0, "a b", "v", vec![])).unwrap();
        let features = featurize_and_attach(&featurizer, &input, &mut arena, first).unwrap();
        assert_eq!(features.len(), 4);
        for pair in features.chunks(2) {
            assert_eq!(pair[1].name, format!("{}-news", pair[0].name));
            assert_eq!(pair[1].value, pair[0].value);
        }

        let other = featurizer.initialize(8, &seq("a b"));
        assert_eq!(other.domain, None);
    }

    #[test]
    fn class_based_without_target_classes_is_rejected() {
        let config = RuleContextConfig {
            add_class_based: true,
            ..RuleContextConfig::default()
        };
        let source_only = Arc::new(ClassMaps::new(
            ClassMap::from_pairs([("a", "A")]),
            ClassMap::new(),
        ));
        assert!(matches!(
            RuleContext::new(FeaturizerId(0), config.clone(), source_only),
            Err(FeatError::InvalidConfig(_))
        ));
        assert!(RuleContext::new(FeaturizerId(0), config, classes()).is_ok());
    }

    #[test]
    fn missing_domain_file_fails_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuleContextConfig {
            domain_file: Some(dir.path().join("nope.txt")),
            ..RuleContextConfig::default()
        };
        assert!(matches!(
            RuleContext::new(FeaturizerId(0), config, classes()),
            Err(FeatError::MissingDomainFile(_))
        ));
    }

    #[test]
    fn parent_without_state_is_a_contract_violation() {
        let featurizer = RuleContext::new(FeaturizerId(0), RuleContextConfig::default(), classes()).unwrap();
        let input = featurizer.initialize(0, &seq("a b"));
        let mut arena = DerivationArena::new(0, 2);
        let first = arena.extend(None, rule(0, "a", "v", vec![])).unwrap();
        let second = arena.extend(Some(first), rule(1, "b", "w", vec![])).unwrap();
        assert!(matches!(
            featurizer.featurize(&input, &arena, second),
            Err(FeatError::ContractViolation(_))
        ));
    }
}
