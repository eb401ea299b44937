use crate::config::LanguageConfig;
use crate::error::BlogError;
use crate::nodes::BlogNodes;
use crate::state::BlogState;
use anyhow::Result;
use log::{debug, info};
use std::collections::BTreeMap;

/// The three fixed graph shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usecase {
    /// title -> content -> end.
    Topic,
    /// title -> content -> route -> one translation -> end.
    Language,
    /// voice-input -> title -> content -> route -> one translation
    /// -> voice-output -> end.
    Voice,
}

impl Usecase {
    /// Selection rule from the original service: spoken input always
    /// takes the voice shape, a non-default target language takes the
    /// translating shape, everything else the plain one.
    pub fn select(voice_input: bool, language: &str, default_language: &str) -> Self {
        if voice_input {
            Self::Voice
        } else if !language.eq_ignore_ascii_case(default_language) {
            Self::Language
        } else {
            Self::Topic
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    VoiceInput,
    TitleCreation,
    ContentGeneration,
    Translation { language: String },
    VoiceOutput,
}

/// Statically-declared mapping from routing decision to translation
/// edge, one edge per supported language. Built alongside the graph so
/// the supported set and the fan-out cannot drift.
#[derive(Debug, Clone)]
pub struct RouteTable {
    edges: BTreeMap<String, Step>,
}

impl RouteTable {
    fn new(languages: &LanguageConfig) -> Result<Self> {
        languages.validate()?;
        let edges = languages
            .supported
            .iter()
            .map(|lang| {
                let key = lang.to_lowercase();
                let step = Step::Translation {
                    language: key.clone(),
                };
                (key, step)
            })
            .collect();
        Ok(Self { edges })
    }

    pub fn edge(&self, key: &str) -> Option<&Step> {
        self.edges.get(key)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// An immutable, executable plan. Compiling is cheap; a new value is
/// produced per call and nothing is shared across requests.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pre_route: Vec<Step>,
    route: Option<RouteTable>,
    post_route: Vec<Step>,
}

/// Pure builder for the three topologies.
pub struct GraphBuilder {
    languages: LanguageConfig,
}

impl GraphBuilder {
    pub fn new(languages: LanguageConfig) -> Self {
        Self { languages }
    }

    pub fn compile(&self, usecase: Usecase) -> Result<CompiledGraph> {
        let graph = match usecase {
            Usecase::Topic => CompiledGraph {
                pre_route: vec![Step::TitleCreation, Step::ContentGeneration],
                route: None,
                post_route: vec![],
            },
            Usecase::Language => CompiledGraph {
                pre_route: vec![Step::TitleCreation, Step::ContentGeneration],
                route: Some(RouteTable::new(&self.languages)?),
                post_route: vec![],
            },
            Usecase::Voice => CompiledGraph {
                pre_route: vec![
                    Step::VoiceInput,
                    Step::TitleCreation,
                    Step::ContentGeneration,
                ],
                route: Some(RouteTable::new(&self.languages)?),
                post_route: vec![Step::VoiceOutput],
            },
        };
        debug!("Compiled {usecase:?} graph");
        Ok(graph)
    }
}

impl CompiledGraph {
    pub fn route_table(&self) -> Option<&RouteTable> {
        self.route.as_ref()
    }

    /// Walk the plan start to end, merging each step's partial update.
    /// Any step failure aborts the walk; no partial state escapes.
    pub async fn invoke(
        &self,
        nodes: &BlogNodes,
        mut state: BlogState,
    ) -> Result<BlogState, BlogError> {
        for step in &self.pre_route {
            run_step(nodes, step, &mut state).await?;
        }

        if let Some(table) = &self.route {
            state.merge(nodes.route(&state));
            let decision = nodes.route_decision(&state);
            info!("Routing to '{}' translation", decision.key());
            let step = table
                .edge(decision.key())
                .ok_or_else(|| BlogError::RouterDefect(decision.key().to_string()))?
                .clone();
            run_step(nodes, &step, &mut state).await?;
        }

        for step in &self.post_route {
            run_step(nodes, step, &mut state).await?;
        }

        Ok(state)
    }
}

async fn run_step(
    nodes: &BlogNodes,
    step: &Step,
    state: &mut BlogState,
) -> Result<(), BlogError> {
    let update = match step {
        Step::VoiceInput => nodes.voice_input(state).await?,
        Step::TitleCreation => nodes.title_creation(state).await?,
        Step::ContentGeneration => nodes.content_generation(state).await?,
        Step::Translation { language } => {
            state.current_language = Some(language.clone());
            nodes.translation(state).await?
        }
        Step::VoiceOutput => nodes.voice_output(state).await?,
    };
    state.merge(update);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::tests::{test_nodes, MockLlm, MockSynthesizer, MockTranscriber};
    use crate::nodes::BlogNodes;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn builder() -> GraphBuilder {
        GraphBuilder::new(LanguageConfig::default())
    }

    #[test]
    fn test_topic_graph_shape() {
        let graph = builder().compile(Usecase::Topic).unwrap();
        assert_eq!(
            graph.pre_route,
            vec![Step::TitleCreation, Step::ContentGeneration]
        );
        assert!(graph.route.is_none());
        assert!(graph.post_route.is_empty());
    }

    #[test]
    fn test_language_graph_has_one_edge_per_supported_language() {
        let graph = builder().compile(Usecase::Language).unwrap();
        let table = graph.route_table().unwrap();
        assert_eq!(table.len(), 5);
        for lang in ["english", "hindi", "french", "spanish", "german"] {
            assert_eq!(
                table.edge(lang),
                Some(&Step::Translation {
                    language: lang.to_string()
                })
            );
        }
    }

    #[test]
    fn test_voice_graph_shape() {
        let graph = builder().compile(Usecase::Voice).unwrap();
        assert_eq!(graph.pre_route[0], Step::VoiceInput);
        assert!(graph.route.is_some());
        assert_eq!(graph.post_route, vec![Step::VoiceOutput]);
    }

    #[test]
    fn test_compile_rejects_default_outside_supported_set() {
        let languages = LanguageConfig {
            supported: vec!["french".to_string()],
            default: "english".to_string(),
            ..LanguageConfig::default()
        };
        let builder = GraphBuilder::new(languages);
        assert!(builder.compile(Usecase::Language).is_err());
        // The shape without a router compiles regardless.
        assert!(builder.compile(Usecase::Topic).is_ok());
    }

    #[test]
    fn test_usecase_selection_rule() {
        assert_eq!(Usecase::select(true, "english", "english"), Usecase::Voice);
        assert_eq!(Usecase::select(false, "french", "english"), Usecase::Language);
        assert_eq!(Usecase::select(false, "English", "english"), Usecase::Topic);
    }

    #[tokio::test]
    async fn test_each_supported_language_reaches_its_translation() {
        for lang in ["english", "hindi", "french", "spanish", "german"] {
            let llm = Arc::new(MockLlm::default());
            let nodes = test_nodes(llm.clone());
            let graph = builder().compile(Usecase::Language).unwrap();

            let state = BlogState {
                topic: Some("Agentic AI".to_string()),
                language: Some(lang.to_string()),
                current_language: Some(lang.to_string()),
                ..BlogState::default()
            };
            let final_state = graph.invoke(&nodes, state).await.unwrap();

            assert_eq!(final_state.current_language.as_deref(), Some(lang));
            assert_eq!(
                final_state.blog_content(),
                format!("[{lang}] translated body"),
                "exactly the {lang} translation step should have run"
            );
            // title + content + one translation
            assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
        }
    }

    #[tokio::test]
    async fn test_unsupported_language_routes_to_default() {
        let nodes = test_nodes(Arc::new(MockLlm::default()));
        let graph = builder().compile(Usecase::Language).unwrap();

        let state = BlogState {
            topic: Some("Agentic AI".to_string()),
            current_language: Some("klingon".to_string()),
            ..BlogState::default()
        };
        let final_state = graph.invoke(&nodes, state).await.unwrap();

        assert_eq!(final_state.current_language.as_deref(), Some("english"));
        assert_eq!(final_state.blog_content(), "[english] translated body");
    }

    #[tokio::test]
    async fn test_step_failure_aborts_the_walk() {
        let llm = Arc::new(MockLlm {
            fail: true,
            ..MockLlm::default()
        });
        let nodes = test_nodes(llm.clone());
        let graph = builder().compile(Usecase::Language).unwrap();

        let state = BlogState {
            topic: Some("Agentic AI".to_string()),
            current_language: Some("french".to_string()),
            ..BlogState::default()
        };
        let err = graph.invoke(&nodes, state).await.unwrap_err();
        assert!(matches!(err, BlogError::ExternalService { .. }));
        // Failed on the first call; the walk stopped there.
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_voice_topology_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("question.wav");
        std::fs::write(&audio, b"fake wav").unwrap();

        let llm = Arc::new(MockLlm::default());
        let synthesizer = Arc::new(MockSynthesizer::default());
        let nodes = BlogNodes::new(
            llm,
            Arc::new(MockTranscriber::default()),
            synthesizer.clone(),
            LanguageConfig::default(),
        );
        let graph = builder().compile(Usecase::Voice).unwrap();

        let state = BlogState {
            language: Some("hindi".to_string()),
            current_language: Some("hindi".to_string()),
            voice_input_path: Some(audio),
            output_type: Some("voice".to_string()),
            ..BlogState::default()
        };
        let final_state = graph.invoke(&nodes, state).await.unwrap();

        assert_eq!(
            final_state.topic.as_deref(),
            Some("Agentic AI in production")
        );
        assert_eq!(final_state.current_language.as_deref(), Some("hindi"));
        assert!(final_state.voice_output.is_some());
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
    }
}
