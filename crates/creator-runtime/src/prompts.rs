//! System prompts for the text features

use creator_core::generation::Feature;

pub fn system_prompt(feature: Feature) -> &'static str {
    match feature {
        Feature::Caption => {
            "You write short social media captions for brands. Return the caption only, \
             with at most five relevant hashtags at the end."
        }
        Feature::ContentPlan => {
            "You are a marketing strategist. Produce a content plan as a numbered list: \
             one line per post with the day, channel, format and a one-sentence idea."
        }
        Feature::Review => {
            "You review marketing copy. List concrete issues with tone, clarity and brand fit, \
             then give a rewritten version."
        }
        Feature::Image | Feature::Video => {
            "You describe visual scenes for a media generation model in one paragraph."
        }
    }
}
