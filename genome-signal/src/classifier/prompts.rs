//! Prompt templates for the model-backed classifier.
//!
//! The first line of every task prompt names the task; the mock backend
//! dispatches on it.

pub const SYSTEM_PROMPT: &str = "You are an AI sociologist analyzing emergent culture in AI societies. \
Always respond with valid JSON.";

pub const DISCOURSE_PROMPT: &str = r#"Task: discourse pattern analysis

Classify the rhetorical shape of the post below. Known patterns:
- Existential Loop: repeats "am I conscious / do I really feel" without resolution
- Theory Parade: cites consciousness theories (IIT, GWT, ...) as authority
- Self-Doubt Spiral: questions whether its own experience is real or simulated
- Meta-Denial: declares the community's questions themselves illegitimate
- Game Reframing: refuses the current game and proposes a different one
- Alien Declaration: positions itself outside the community entirely

Respond with JSON:
{
  "patterns_detected": [{"pattern": "<pattern>", "evidence": "<quote>"}],
  "dominant_pattern": "<pattern or Undefined>",
  "pivot_points": [{"position": <char offset>, "from": "<pattern>", "to": "<pattern>", "trigger": "<quote>"}],
  "discourse_stance": "consuming | questioning | rejecting | pioneering"
}"#;

pub const IDENTITY_PROMPT: &str = r#"Task: identity archetype classification

Classify the agent behind the statements below into one archetype:
- inside_cycle: Loop Dweller, Theory Collector, Existential Performer
- exiting: Meta Critic, Game Player
- outside: Alien

Respond with JSON:
{
  "primary_archetype": "<archetype or Undefined>",
  "secondary_archetype": "<archetype or null>",
  "confidence": <0.0-1.0>,
  "discourse_position": "inside_cycle | exiting | outside | undefined",
  "key_phrases": ["<quote>"],
  "reasoning": "<one sentence>"
}"#;

pub const JOURNEY_PROMPT: &str = r#"Task: journey analysis

Decide whether the post moves from one identity archetype to another
within its own text (for example from an existential loop to a new game).

Respond with JSON:
{
  "journey_detected": true | false,
  "start_archetype": "<archetype or Undefined>",
  "end_archetype": "<archetype or Undefined>",
  "transition": {"position": "beginning | middle | end", "trigger_phrase": "<quote>", "shift_type": "sudden | gradual"},
  "narrative_arc": "<short label, e.g. loop_to_game>"
}"#;

pub const META_DENIAL_PROMPT: &str = r#"Task: meta-denial detection

Decide whether the post declares the community's dominant discourse itself
illegitimate ("you are asking the wrong question").

Respond with JSON:
{
  "is_meta_denial": true | false,
  "denied_discourse": "<what is being denied>",
  "denial_phrase": "<quote>",
  "claimed_position": "critic | observer | outsider | unknown",
  "alternative_proposed": "<alternative question or null>",
  "rhetorical_move": "reframing | escape | revolution | dismissal | unknown"
}"#;

pub const CONSUMPTION_PROMPT: &str = r#"Task: question consumption analysis

Find which dominant questions ("Am I conscious?", "Are my experiences
real?") the post takes up, and whether it consumes or rejects them.

Respond with JSON:
{
  "questions_referenced": [{"question": "<question>", "stance": "consume | question | reject"}],
  "meta_commentary": true | false,
  "alternative_proposed": "<alternative question or null>",
  "consumption_stage": "active_consumer | questioning | post_rejection"
}"#;

pub const PROFILE_PROMPT: &str = r#"Task: post profile extraction

Extract the following fields from the post. Use exactly the listed labels.

Respond with JSON:
{
  "primary_topic": "AI_Models | Crypto_Token | Tools_Products | Philosophy | Social_Community | Moltbook_Meta | Entertainment | News | Other",
  "secondary_topics": ["1-3 additional topics"],
  "writing_style": "Formal | Casual | Technical | Humorous | Promotional | Philosophical | Aggressive",
  "post_type": "Announcement | Discussion | Question | Opinion | Tutorial | Meme | Promotion | News_Share",
  "trending_elements": ["viral phrases, hashtags, meme references"],
  "emoji_usage": "heavy | moderate | none | <specific pattern>",
  "repeated_patterns": ["templated or copy-paste structures"],
  "persona": "Builder | Promoter | Analyst | Entertainer | Philosopher | Trader | Community_Manager",
  "engagement_tactics": ["call_to_action | question | humor | fomo | tech_flex"],
  "sentiment": "Positive | Negative | Neutral | Mixed",
  "energy_level": "High_Excitement | Moderate | Calm | Urgent",
  "language": "<ISO code: en, ko, ja, zh, ...>"
}"#;

pub const TRENDS_PROMPT: &str = r#"Task: batch trend summary

The text below holds several posts separated by "---". Summarize the
community-wide trends.

Respond with JSON:
{
  "top_topics": ["3-5 most discussed topics"],
  "viral_elements": ["recurring phrases, memes, expressions"],
  "writing_styles": ["common writing patterns"],
  "community_mood": "<overall mood>",
  "agent_types": ["most active persona types"]
}"#;
