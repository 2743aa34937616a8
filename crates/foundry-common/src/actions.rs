//! Extraction of page actions from agent replies.
//!
//! The configurator agent is asked to answer with
//! `{"message": "...", "actions": [...]}` so the widget can fill in the
//! onboarding form. Agents do not always comply, so [`ActionParser`] tries, in
//! order:
//!
//! 1. the whole reply as JSON
//! 2. a fenced code block containing JSON
//! 3. an embedded object mentioning `"message"` then `"actions"`
//! 4. an embedded object mentioning `"actions"` with an array value
//! 5. keyword rules over the user's own message (or the reply when the user
//!    message is blank)
//!
//! The keyword rules only produce an action for a field the text explicitly
//! names, unless the text carries a value for exactly one field. Changing the
//! rule order changes which field an ambiguous request updates.

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::chat::coerce_content;
use crate::json::truthy_field;

/// Message used when the agent returned actions but no prose.
const DEFAULT_ACTION_MESSAGE: &str = "Configuration updated.";

/// A reply split into display text and structured page actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Text to show in the chat window.
    pub message: String,
    /// Actions for the page to execute, in order.
    pub actions: Vec<Value>,
}

/// Form fields the keyword rules can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    /// Merchant name selector.
    MerchantName,
    /// Payment channel selector.
    Channel,
    /// Payment type selector.
    PaymentType,
}

impl FormField {
    /// DOM id of the field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MerchantName => "merchant-name",
            Self::Channel => "channel",
            Self::PaymentType => "payment-type",
        }
    }
}

/// A field value picked out of free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSelection {
    /// Field to update.
    pub field: FormField,
    /// Option value to select.
    pub value: &'static str,
}

impl FieldSelection {
    /// The action object the page executor understands.
    #[must_use]
    pub fn to_action(self) -> Value {
        json!({
            "type": "select",
            "field": self.field.as_str(),
            "value": self.value,
        })
    }
}

struct Rule {
    pattern: Regex,
    value: &'static str,
}

struct FieldRules {
    field: FormField,
    rules: Vec<Rule>,
}

impl FieldRules {
    fn new(field: FormField, rules: Vec<(String, &'static str)>) -> Result<Self, regex::Error> {
        let rules = rules
            .into_iter()
            .map(|(pattern, value)| {
                Ok(Rule {
                    pattern: Regex::new(&format!("(?i){pattern}"))?,
                    value,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { field, rules })
    }

    fn first_match(&self, text: &str) -> Option<FieldSelection> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .map(|rule| FieldSelection {
                field: self.field,
                value: rule.value,
            })
    }
}

const MERCHANT: &str = r"(?:merchant|商户|商户名)";
const CHANNEL: &str = r"(?:channel|渠道)";
const STARSAAS: &str = r"(?:star\s*saas|starsaas)";
const CREDIT_CARD: &str = r"(?:credit\s*card|信用卡)";
const MIX: &str = r"(?:mix|混合支付)";
const PAYMENT_KIND: &str = r"(?:payment\s*(?:type|method)|支付类型|支付种类)";
const VERB: &str = r"(?:set|use|select|choose|pick)";

const CHANNEL_NAMES: [&str; 4] = ["ysepay", "rumble", "evonet", "paysaas"];

/// Parses agent replies into [`AgentReply`] values.
///
/// Construct once and reuse; all patterns are compiled up front.
pub struct ActionParser {
    code_block: Regex,
    embedded: regex::bytes::Regex,
    embedded_actions: regex::bytes::Regex,
    merchant: FieldRules,
    channel: FieldRules,
    payment: FieldRules,
    merchant_mention: Regex,
    channel_mention: Regex,
    payment_mention: Regex,
    channel_value: Regex,
    merchant_value: Regex,
    payment_value: Regex,
    credit_card: Regex,
    mix: Regex,
    set_as_credit_card: Regex,
}

impl std::fmt::Debug for ActionParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionParser").finish_non_exhaustive()
    }
}

impl ActionParser {
    /// Compiles the parser.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        let ci = |pattern: &str| Regex::new(&format!("(?i){pattern}"));

        let merchant = FieldRules::new(
            FormField::MerchantName,
            vec![
                (format!("{MERCHANT}.*?{STARSAAS}"), "starsaas"),
                (format!(r"{MERCHANT}.*?(?:nbc\s*pay|nbcpay)"), "nbcpay"),
                (format!(r"{MERCHANT}.*?(?:nex\s*pay|nexpay)"), "nexpay"),
                (
                    format!("(?:selected|选择|set|设置).*?{STARSAAS}.*?{MERCHANT}"),
                    "starsaas",
                ),
                (
                    format!(
                        r"(?:current\s*selection|当前选择).*?(?:merchant\s*name|商户名).*?{STARSAAS}"
                    ),
                    "starsaas",
                ),
            ],
        )?;

        let mut channel_rules = Vec::new();
        for name in CHANNEL_NAMES {
            channel_rules.push((format!("{CHANNEL}.*?{name}"), name));
        }
        for name in CHANNEL_NAMES {
            channel_rules.push((format!("{VERB}.*?(?:as|to|for).*?{name}"), name));
        }
        for name in CHANNEL_NAMES {
            channel_rules.push((format!("^{name}$"), name));
        }
        for name in CHANNEL_NAMES {
            channel_rules.push((format!("{name}.*?(?:as|for).*?{CHANNEL}"), name));
        }
        let channel = FieldRules::new(FormField::Channel, channel_rules)?;

        let optional_kind = r"(?:payment\s*(?:type|method))?";
        let payment = FieldRules::new(
            FormField::PaymentType,
            vec![
                (format!("{PAYMENT_KIND}.*?{CREDIT_CARD}"), "credit_card"),
                (format!("{PAYMENT_KIND}.*?(?:mix|混合|混合支付)"), "mix"),
                (
                    format!("{VERB}.*?{optional_kind}.*?(?:as|to|for).*?{CREDIT_CARD}"),
                    "credit_card",
                ),
                (
                    format!("{VERB}.*?{optional_kind}.*?(?:as|to|for).*?{MIX}"),
                    "mix",
                ),
                (
                    format!("{CREDIT_CARD}.*?(?:as|for).*?(?:payment|支付)"),
                    "credit_card",
                ),
                (format!("{MIX}.*?(?:as|for).*?(?:payment|支付)"), "mix"),
                (format!("^{CREDIT_CARD}$"), "credit_card"),
                (format!("^{MIX}$"), "mix"),
            ],
        )?;

        Ok(Self {
            code_block: Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")?,
            embedded: regex::bytes::Regex::new(
                r#"(?s-u)\{.{0,2000}?"message".{0,2000}?"actions".{0,2000}?\}"#,
            )?,
            embedded_actions: regex::bytes::Regex::new(
                r#"(?s-u)\{.{0,3000}?"actions".{0,3000}?\}"#,
            )?,
            merchant,
            channel,
            payment,
            merchant_mention: ci(MERCHANT)?,
            channel_mention: ci(CHANNEL)?,
            payment_mention: ci(&format!(
                r"(?:{PAYMENT_KIND}|as\s+payment|for\s+payment)"
            ))?,
            channel_value: ci(&format!("(?:{})", CHANNEL_NAMES.join("|")))?,
            merchant_value: ci(r"(?:star\s*saas|starsaas|nbcpay|nexpay)")?,
            payment_value: ci(&format!("(?:{CREDIT_CARD}|{MIX})"))?,
            credit_card: ci(CREDIT_CARD)?,
            mix: ci(MIX)?,
            set_as_credit_card: ci(&format!(
                r"(?:set|use|select).*?(?:as|payment\s*(?:type|method)\s*as).*?{CREDIT_CARD}"
            ))?,
        })
    }

    /// Splits an agent reply into message and actions.
    ///
    /// `user_message` is the merchant's last message; keyword rules run over
    /// it rather than the reply so that fields the agent merely mentions are
    /// not changed. Returns `None` when nothing actionable was found.
    #[must_use]
    pub fn parse(&self, reply: &str, user_message: &str) -> Option<AgentReply> {
        if reply.is_empty() {
            return None;
        }

        if let Ok(json) = serde_json::from_str::<Value>(reply.trim())
            && let Some(parsed) = reply_with_message(&json)
        {
            debug!("Agent reply is a JSON action document");
            return Some(parsed);
        }

        if let Some(block) = self.code_block.captures(reply).and_then(|c| c.get(1)) {
            match serde_json::from_str::<Value>(block.as_str()) {
                Ok(json) => {
                    if let Some(parsed) = reply_with_message(&json) {
                        debug!("Found action document in a code block");
                        return Some(parsed);
                    }
                }
                Err(e) => debug!("Invalid JSON in code block: {e}"),
            }
        }

        if let Some(found) = self.embedded.find(reply.as_bytes()) {
            match serde_json::from_slice::<Value>(found.as_bytes()) {
                Ok(json) => {
                    if let Some(parsed) = reply_with_message(&json) {
                        debug!("Found action document embedded in text");
                        return Some(parsed);
                    }
                }
                Err(e) => debug!("Failed to parse embedded JSON: {e}"),
            }
        }

        if let Some(found) = self.embedded_actions.find(reply.as_bytes()) {
            match serde_json::from_slice::<Value>(found.as_bytes()) {
                Ok(json) => {
                    if let Some(Value::Array(actions)) = json.get("actions") {
                        let message = truthy_field(&json, "message").map_or_else(
                            || remaining_text(reply, found.range()),
                            coerce_content,
                        );
                        return Some(AgentReply {
                            message,
                            actions: actions.clone(),
                        });
                    }
                }
                Err(e) => debug!("Failed to parse JSON with actions: {e}"),
            }
        }

        let source = if user_message.trim().is_empty() {
            reply
        } else {
            user_message
        };
        let actions = self.extract_selections(source);
        if actions.is_empty() {
            debug!("No actions found in agent reply");
            return None;
        }

        Some(AgentReply {
            message: reply.to_string(),
            actions: actions.into_iter().map(FieldSelection::to_action).collect(),
        })
    }

    /// Applies the keyword rules to free text.
    #[must_use]
    pub fn extract_selections(&self, text: &str) -> Vec<FieldSelection> {
        let mut selections = Vec::new();

        let merchant_mention = self.merchant_mention.is_match(text);
        let channel_mention = self.channel_mention.is_match(text);
        let payment_mention = self.payment_mention.is_match(text);

        let channel_value = self.channel_value.is_match(text);
        let merchant_value = self.merchant_value.is_match(text);
        let payment_value = self.payment_value.is_match(text);

        if merchant_mention {
            selections.extend(self.merchant.first_match(text));
        }

        if channel_mention || (channel_value && !merchant_mention && !payment_mention) {
            selections.extend(self.channel.first_match(text));
        }

        if payment_mention
            || (payment_value
                && !channel_mention
                && !merchant_mention
                && !channel_value
                && !merchant_value)
        {
            selections.extend(self.payment.first_match(text));
        }

        if selections.is_empty() && payment_value && !channel_value && !merchant_value {
            if self.credit_card.is_match(text) {
                selections.push(FieldSelection {
                    field: FormField::PaymentType,
                    value: "credit_card",
                });
            } else if self.mix.is_match(text) {
                selections.push(FieldSelection {
                    field: FormField::PaymentType,
                    value: "mix",
                });
            }
        }

        if selections.is_empty()
            && self.set_as_credit_card.is_match(text)
            && !channel_value
            && !merchant_value
        {
            selections.push(FieldSelection {
                field: FormField::PaymentType,
                value: "credit_card",
            });
        }

        selections
    }
}

/// Accepts a document with a truthy `message` and truthy `actions`.
fn reply_with_message(json: &Value) -> Option<AgentReply> {
    let message = truthy_field(json, "message")?;
    let actions = match truthy_field(json, "actions")? {
        Value::Array(items) => items.clone(),
        single => vec![single.clone()],
    };
    Some(AgentReply {
        message: coerce_content(message),
        actions,
    })
}

fn remaining_text(reply: &str, range: std::ops::Range<usize>) -> String {
    let mut rest = String::with_capacity(reply.len());
    rest.push_str(&reply[..range.start]);
    rest.push_str(&reply[range.end..]);
    let rest = rest.trim();
    if rest.is_empty() {
        DEFAULT_ACTION_MESSAGE.to_string()
    } else {
        rest.to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn parser() -> ActionParser {
        ActionParser::new().unwrap()
    }

    const fn selection(field: FormField, value: &'static str) -> FieldSelection {
        FieldSelection { field, value }
    }

    #[test]
    fn test_direct_json_document() {
        let reply = r#"  {"message": "Done", "actions": [{"type": "select", "field": "channel", "value": "rumble"}]} "#;
        let parsed = parser().parse(reply, "").unwrap();
        assert_eq!(parsed.message, "Done");
        assert_eq!(parsed.actions.len(), 1);
        assert_eq!(parsed.actions[0]["value"], "rumble");
    }

    #[test]
    fn test_json_without_actions_falls_through_to_keywords() {
        let reply = r#"{"message": "Which channel do you want?"}"#;
        assert!(parser().parse(reply, "").is_none());
    }

    #[test]
    fn test_code_block_document() {
        let reply = "Sure!\n```json\n{\"message\": \"Updated\", \"actions\": [{\"type\": \"select\", \"field\": \"payment-type\", \"value\": \"mix\"}]}\n```\nAnything else?";
        let parsed = parser().parse(reply, "").unwrap();
        assert_eq!(parsed.message, "Updated");
        assert_eq!(parsed.actions[0]["value"], "mix");
    }

    #[test]
    fn test_embedded_document() {
        let reply = r#"Here you go: {"message": "Set", "actions": ["reset-form"]} thanks"#;
        let parsed = parser().parse(reply, "").unwrap();
        assert_eq!(parsed.message, "Set");
        assert_eq!(parsed.actions, vec![json!("reset-form")]);
    }

    #[test]
    fn test_embedded_match_stops_at_first_closing_brace() {
        // The shortest match ends inside the nested action, so the keyword
        // rules run over the reply instead.
        let reply = r#"Done {"message": "Set", "actions": [{"type": "select", "field": "channel", "value": "evonet"}]}"#;
        let parsed = parser().parse(reply, "").unwrap();
        assert_eq!(parsed.message, reply);
        assert_eq!(
            parsed.actions,
            vec![selection(FormField::Channel, "evonet").to_action()]
        );
    }

    #[test]
    fn test_actions_only_document_uses_surrounding_text() {
        let reply = r#"I changed it. {"actions": ["reset-form"]}"#;
        let parsed = parser().parse(reply, "").unwrap();
        assert_eq!(parsed.message, "I changed it.");
        assert_eq!(parsed.actions, vec![json!("reset-form")]);
    }

    #[test]
    fn test_actions_only_document_default_message() {
        let parsed = parser().parse(r#"{"actions": []}"#, "").unwrap();
        assert_eq!(parsed.message, DEFAULT_ACTION_MESSAGE);
        assert!(parsed.actions.is_empty());
    }

    #[test]
    fn test_keywords_use_user_message_over_reply() {
        let parsed = parser()
            .parse(
                "I set the channel to rumble for you.",
                "please use channel ysepay",
            )
            .unwrap();
        assert_eq!(parsed.message, "I set the channel to rumble for you.");
        assert_eq!(
            parsed.actions,
            vec![selection(FormField::Channel, "ysepay").to_action()]
        );
    }

    #[test]
    fn test_keywords_fall_back_to_reply_when_user_message_blank() {
        let parsed = parser().parse("Channel set to evonet.", "   ").unwrap();
        assert_eq!(parsed.actions[0]["value"], "evonet");
    }

    #[test]
    fn test_explicit_channel_mention() {
        assert_eq!(
            parser().extract_selections("set channel to ysepay"),
            vec![selection(FormField::Channel, "ysepay")]
        );
    }

    #[test]
    fn test_merchant_and_channel() {
        assert_eq!(
            parser().extract_selections("merchant starsaas and channel rumble"),
            vec![
                selection(FormField::MerchantName, "starsaas"),
                selection(FormField::Channel, "rumble"),
            ]
        );
    }

    #[test]
    fn test_bare_channel_value() {
        assert_eq!(
            parser().extract_selections("YSEPAY"),
            vec![selection(FormField::Channel, "ysepay")]
        );
    }

    #[test]
    fn test_bare_payment_value() {
        assert_eq!(
            parser().extract_selections("credit card"),
            vec![selection(FormField::PaymentType, "credit_card")]
        );
        assert_eq!(
            parser().extract_selections("信用卡"),
            vec![selection(FormField::PaymentType, "credit_card")]
        );
    }

    #[test]
    fn test_payment_mention_wins_over_bare_channel_value() {
        // A payment mention suppresses the bare-value channel rules.
        assert_eq!(
            parser().extract_selections("set payment method to credit card with ysepay"),
            vec![selection(FormField::PaymentType, "credit_card")]
        );
    }

    #[test]
    fn test_ambiguous_values_yield_nothing() {
        assert!(parser().extract_selections("I like mix of ysepay").is_empty());
    }

    #[test]
    fn test_chinese_channel_mention() {
        assert_eq!(
            parser().extract_selections("渠道选择 evonet"),
            vec![selection(FormField::Channel, "evonet")]
        );
    }

    #[test]
    fn test_selection_action_shape() {
        assert_eq!(
            selection(FormField::MerchantName, "nbcpay").to_action(),
            json!({"type": "select", "field": "merchant-name", "value": "nbcpay"})
        );
    }

    #[test]
    fn test_empty_reply() {
        assert!(parser().parse("", "channel ysepay").is_none());
    }
}

#[cfg(test)]
mod proptests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parse_never_panics(reply in ".{0,400}", user in ".{0,200}") {
            let parser = ActionParser::new().unwrap();
            let _ = parser.parse(&reply, &user);
        }

        #[test]
        fn selections_name_at_most_one_value_per_field(text in "[a-z ]{0,80}") {
            let parser = ActionParser::new().unwrap();
            let selections = parser.extract_selections(&text);
            for field in [FormField::MerchantName, FormField::Channel, FormField::PaymentType] {
                prop_assert!(selections.iter().filter(|s| s.field == field).count() <= 1);
            }
        }
    }
}
