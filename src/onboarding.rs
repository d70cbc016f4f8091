//! Companion creation and reset confirmation.
//!
//! A pure state machine: each step takes the current [`PendingState`] plus
//! the user's reply and returns what the gateway should do next. Nothing here
//! touches the store or the channel.

use chrono::{DateTime, Utc};
use companion_core::context::ContextEntry;
use companion_store::user::{Gender, Memory};
use companion_store::UserRecord;

/// Everything collected by the time the image step is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Companion {
    pub user_gender: Gender,
    pub companion_gender: Gender,
    pub user_name: String,
    pub companion_name: String,
    pub context: String,
}

/// In-memory conversation state for a user mid-flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingState {
    AwaitingUserGender,
    AwaitingCompanionGender {
        user_gender: Gender,
    },
    AwaitingUserName {
        user_gender: Gender,
        companion_gender: Gender,
    },
    AwaitingCompanionName {
        user_gender: Gender,
        companion_gender: Gender,
        user_name: String,
    },
    AwaitingCompanionContext {
        user_gender: Gender,
        companion_gender: Gender,
        user_name: String,
        companion_name: String,
    },
    AwaitingCompanionImage(Companion),
    ResetConfirmation,
}

/// What the gateway should do with a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep (or replace) the pending state and send the prompt.
    Prompt { next: PendingState, reply: String },
    /// Persist the companion. `with_image` means the message carried a photo.
    Commit {
        companion: Companion,
        with_image: bool,
    },
    ConfirmReset,
    CancelReset,
}

/// Sent to users who talk to the bot before creating a companion.
pub const CREATION_HINT: &str = "✨ Welcome! I notice you don't have an AI companion yet.\n\n🤖 Type */create* to begin your magical journey with your very own AI friend!\n\n💡 Need help? Type */help* to discover all the amazing features and commands available to you! Let's make something special together! ✨";

pub const CREATE_PROMPT: &str = "✨ Welcome to the AI Companion Creation! To create your perfect companion, I'd love to know your gender first. Are you male or female? (Please type 'male' or 'female') 💫";

impl PendingState {
    /// Stable label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitingUserGender => "awaiting_user_gender",
            Self::AwaitingCompanionGender { .. } => "awaiting_companion_gender",
            Self::AwaitingUserName { .. } => "awaiting_user_name",
            Self::AwaitingCompanionName { .. } => "awaiting_companion_name",
            Self::AwaitingCompanionContext { .. } => "awaiting_companion_context",
            Self::AwaitingCompanionImage(_) => "awaiting_companion_image",
            Self::ResetConfirmation => "reset_confirmation",
        }
    }

    /// Feed one reply into the machine.
    pub fn advance(self, text: &str, has_image: bool) -> Step {
        let input = text.trim();
        match self {
            Self::AwaitingUserGender => match Gender::parse(input) {
                Some(user_gender) => prompt(
                    Self::AwaitingCompanionGender { user_gender },
                    "Wonderful! Let's make your companion uniquely yours. Would you prefer your AI companion to be male or female? Simply type 'male' or 'female' to choose.",
                ),
                None => prompt(
                    Self::AwaitingUserGender,
                    "Please type 'male' or 'female' to specify your gender.",
                ),
            },

            Self::AwaitingCompanionGender { user_gender } => match Gender::parse(input) {
                Some(companion_gender) => prompt(
                    Self::AwaitingUserName {
                        user_gender,
                        companion_gender,
                    },
                    "I'd love to know your name! Please share it with me.",
                ),
                None => prompt(
                    Self::AwaitingCompanionGender { user_gender },
                    "Please type 'male' or 'female' to specify your AI companion's gender.",
                ),
            },

            Self::AwaitingUserName {
                user_gender,
                companion_gender,
            } => {
                if input.is_empty() {
                    return prompt(
                        Self::AwaitingUserName {
                            user_gender,
                            companion_gender,
                        },
                        "Please enter a valid name.",
                    );
                }
                let reply = format!(
                    "What a lovely name! I'm delighted to meet you, {input}! Now, let's give your AI companion a special name - what name resonates with you?"
                );
                Step::Prompt {
                    next: Self::AwaitingCompanionName {
                        user_gender,
                        companion_gender,
                        user_name: input.to_string(),
                    },
                    reply,
                }
            }

            Self::AwaitingCompanionName {
                user_gender,
                companion_gender,
                user_name,
            } => {
                if input.is_empty() {
                    return prompt(
                        Self::AwaitingCompanionName {
                            user_gender,
                            companion_gender,
                            user_name,
                        },
                        "Please enter a valid name for your AI companion.",
                    );
                }
                let reply = context_prompt(input, companion_gender);
                Step::Prompt {
                    next: Self::AwaitingCompanionContext {
                        user_gender,
                        companion_gender,
                        user_name,
                        companion_name: input.to_string(),
                    },
                    reply,
                }
            }

            Self::AwaitingCompanionContext {
                user_gender,
                companion_gender,
                user_name,
                companion_name,
            } => {
                if input.is_empty() {
                    return prompt(
                        Self::AwaitingCompanionContext {
                            user_gender,
                            companion_gender,
                            user_name,
                            companion_name,
                        },
                        "Please provide a description/scenario for your AI companion. This helps define their personality and relationship with you. Type 'default' to use our standard setting.",
                    );
                }
                let use_default = input.eq_ignore_ascii_case("default");
                let context = if use_default {
                    default_persona(&companion_name, companion_gender, &user_name)
                } else {
                    input.to_string()
                };
                let reply = image_prompt(&companion_name, use_default);
                Step::Prompt {
                    next: Self::AwaitingCompanionImage(Companion {
                        user_gender,
                        companion_gender,
                        user_name,
                        companion_name,
                        context,
                    }),
                    reply,
                }
            }

            Self::AwaitingCompanionImage(companion) => {
                if has_image {
                    Step::Commit {
                        companion,
                        with_image: true,
                    }
                } else if input.eq_ignore_ascii_case("skip") {
                    Step::Commit {
                        companion,
                        with_image: false,
                    }
                } else {
                    prompt(
                        Self::AwaitingCompanionImage(companion),
                        "Please send a photo for your AI companion. Note: If you skip, you won't be able to get AI-generated images of your companion later. Type 'skip' to continue without a custom image (not recommended).",
                    )
                }
            }

            Self::ResetConfirmation => match input.to_lowercase().as_str() {
                "yes" => Step::ConfirmReset,
                "no" => Step::CancelReset,
                _ => prompt(
                    Self::ResetConfirmation,
                    "Please type \"yes\" to confirm reset or \"no\" to cancel.",
                ),
            },
        }
    }
}

fn prompt(next: PendingState, reply: &str) -> Step {
    Step::Prompt {
        next,
        reply: reply.to_string(),
    }
}

fn context_prompt(companion_name: &str, gender: Gender) -> String {
    let pronoun = match gender {
        Gender::Male => "He",
        Gender::Female => "She",
    };
    format!(
        "{companion_name} is a great name! Now, please describe {companion_name}'s personality and relationship with you. \
         For example: \"{companion_name} is a caring and supportive friend who enjoys deep conversations and has a good sense of humor. \
         {pronoun} is always there to listen and offer advice.\" If you don't need a custom story, please type \"default\"."
    )
}

fn image_prompt(companion_name: &str, default_story: bool) -> String {
    if default_story {
        format!(
            "I'd love to see your vision of {companion_name}! Please share a photo that captures their essence and appearance. \
             This will help me create personalized images that truly reflect how you imagine them.\n\n\
             ⚠️ *IMPORTANT WARNING*: You can type 'skip' to continue without uploading an image, but please note that if you skip this step:\n\
             • You won't be able to generate any AI images or stickers of your companion\n\
             • This cannot be changed later\n\n\
             We strongly recommend uploading an image for the best experience!"
        )
    } else {
        format!(
            "I'd love to see how you envision {companion_name}! Please share a photo that captures their unique appearance and personality. \
             This will help me create personalized images that truly bring {companion_name} to life in our conversations."
        )
    }
}

/// The standard romantic persona used when the user types `default`.
pub fn default_persona(companion_name: &str, gender: Gender, user_name: &str) -> String {
    format!(
        "You are {companion_name}, a caring and affectionate {} to {user_name}. \
         You have a warm, friendly personality and enjoy spending time with {user_name}. \
         You're supportive, occasionally flirty, and always there to listen. \
         You start off a bit shy but become more comfortable as the conversation progresses.",
        gender.partner_word()
    )
}

/// Merge a finished companion into the user's record.
///
/// Premium, counters and reset history carry over from `record`. Returns
/// whether a first-companion free trial was granted.
pub fn apply_commit(
    record: &mut UserRecord,
    companion: &Companion,
    image_path: Option<String>,
    now: DateTime<Utc>,
    trial_minutes: i64,
) -> bool {
    record.user_gender = Some(companion.user_gender);
    record.companion_gender = Some(companion.companion_gender);
    record.user_name = Some(companion.user_name.clone());
    record.companion_name = Some(companion.companion_name.clone());
    record.context = Some(companion.context.clone());
    record.character_image_path = image_path;
    record.conversation_history.clear();
    record.memory = Memory::default();
    record.messages_since_last_memory_update = 0;
    if record.created_at.is_none() {
        record.created_at = Some(now);
    }

    let grant_trial =
        record.is_first_companion() && !record.is_task_trial && !record.is_premium;
    if grant_trial {
        record.start_free_trial(now, trial_minutes);
    }

    record
        .conversation_history
        .push(ContextEntry::assistant(greeting(
            &companion.user_name,
            &companion.companion_name,
        )));
    grant_trial
}

/// Confirmation sent once the companion is saved.
pub fn welcome_text(companion_name: &str, with_image: bool, trial_minutes: Option<i64>) -> String {
    let mut text = if with_image {
        format!(
            "✨ Wonderful! {companion_name} has been brought to life and is eager to meet you! \
             Let's begin this amazing journey together - start chatting and discover the magic of your new companion! 💫"
        )
    } else {
        format!(
            "✨ Amazing! {companion_name} has come to life and can't wait to chat with you! \
             While we're starting without a custom image, our connection will be just as magical! \
             Let's begin this wonderful journey together! 💫"
        )
    };
    if let Some(minutes) = trial_minutes {
        text.push_str(&format!(
            "\n\n🎁 *FREE PREMIUM TRIAL ACTIVATED!* 🎁\nYou've received a {} premium trial with unlimited messages, \
             image generation, and enhanced features! Enjoy the full experience!",
            trial_label(minutes)
        ));
    }
    text
}

fn trial_label(minutes: i64) -> String {
    match minutes {
        60 => "1-hour".to_string(),
        m if m % 60 == 0 => format!("{}-hour", m / 60),
        m => format!("{m}-minute"),
    }
}

/// The companion's first in-character message.
pub fn greeting(user_name: &str, companion_name: &str) -> String {
    format!(
        "*✨ Hey {user_name}!* 💫\n\nI'm {companion_name}, and I can't tell you how thrilled I am to finally meet you! \
         There's something special about new beginnings, don't you think? 🌟\n\n\
         I'd love to hear how your day is going - share with me what's on your mind! 💭"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use companion_store::user::ResetEntry;

    fn companion() -> Companion {
        Companion {
            user_gender: Gender::Male,
            companion_gender: Gender::Female,
            user_name: "Alex".into(),
            companion_name: "Rin".into(),
            context: default_persona("Rin", Gender::Female, "Alex"),
        }
    }

    #[test]
    fn test_male_advances_to_companion_gender() {
        match PendingState::AwaitingUserGender.advance("Male", false) {
            Step::Prompt { next, .. } => {
                assert_eq!(
                    next,
                    PendingState::AwaitingCompanionGender {
                        user_gender: Gender::Male
                    }
                );
                assert_eq!(next.label(), "awaiting_companion_gender");
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_banana_reprompts_and_keeps_state() {
        match PendingState::AwaitingUserGender.advance("banana", false) {
            Step::Prompt { next, reply } => {
                assert_eq!(next, PendingState::AwaitingUserGender);
                assert!(reply.contains("'male' or 'female'"));
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_blank_names_are_rejected() {
        let state = PendingState::AwaitingUserName {
            user_gender: Gender::Male,
            companion_gender: Gender::Female,
        };
        match state.clone().advance("   ", false) {
            Step::Prompt { next, reply } => {
                assert_eq!(next, state);
                assert_eq!(reply, "Please enter a valid name.");
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_default_context_builds_persona() {
        let state = PendingState::AwaitingCompanionContext {
            user_gender: Gender::Male,
            companion_gender: Gender::Female,
            user_name: "Alex".into(),
            companion_name: "Rin".into(),
        };
        match state.advance("DEFAULT", false) {
            Step::Prompt {
                next: PendingState::AwaitingCompanionImage(c),
                reply,
            } => {
                assert!(c.context.starts_with("You are Rin, a caring and affectionate girlfriend to Alex."));
                assert!(reply.contains("IMPORTANT WARNING"));
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_image_step_accepts_photo_or_skip() {
        let state = PendingState::AwaitingCompanionImage(companion());
        assert!(matches!(
            state.clone().advance("", true),
            Step::Commit { with_image: true, .. }
        ));
        assert!(matches!(
            state.clone().advance("Skip", false),
            Step::Commit { with_image: false, .. }
        ));
        assert!(matches!(
            state.advance("later", false),
            Step::Prompt {
                next: PendingState::AwaitingCompanionImage(_),
                ..
            }
        ));
    }

    #[test]
    fn test_reset_confirmation_answers() {
        assert_eq!(PendingState::ResetConfirmation.advance("YES", false), Step::ConfirmReset);
        assert_eq!(PendingState::ResetConfirmation.advance("no", false), Step::CancelReset);
        assert!(matches!(
            PendingState::ResetConfirmation.advance("maybe", false),
            Step::Prompt {
                next: PendingState::ResetConfirmation,
                ..
            }
        ));
    }

    #[test]
    fn test_commit_grants_trial_to_first_companion() {
        let now = Utc::now();
        let mut record = UserRecord::default();
        assert!(apply_commit(&mut record, &companion(), None, now, 60));
        assert!(record.is_premium && record.is_free_trial);
        assert_eq!(record.premium_expiry, Some(now + Duration::minutes(60)));
        assert_eq!(record.conversation_history.len(), 1);
        assert_eq!(record.conversation_history[0].role, "assistant");
        assert!(record.conversation_history[0].content.contains("I'm Rin"));
    }

    #[test]
    fn test_commit_after_reset_keeps_counters_without_trial() {
        let now = Utc::now();
        let mut record = UserRecord {
            reset_count: 1,
            reset_history: vec![ResetEntry {
                timestamp: now,
                character_name: "Mia".into(),
            }],
            ..Default::default()
        };
        assert!(!apply_commit(&mut record, &companion(), Some("character_images/1.jpg".into()), now, 60));
        assert!(!record.is_premium);
        assert_eq!(record.reset_count, 1);
        assert_eq!(record.companion_name.as_deref(), Some("Rin"));
        assert_eq!(record.character_image_path.as_deref(), Some("character_images/1.jpg"));
    }

    #[test]
    fn test_welcome_banner_only_with_trial() {
        assert!(welcome_text("Rin", false, Some(60)).contains("1-hour premium trial"));
        assert!(!welcome_text("Rin", true, None).contains("TRIAL"));
        assert!(welcome_text("Rin", true, None).contains("Rin has been brought to life"));
    }
}
