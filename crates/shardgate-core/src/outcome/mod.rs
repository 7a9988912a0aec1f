//! Decodes the outcome of a smart-contract execution from a completed
//! transaction's results, events and logs.
//!
//! Observers spread the execution verdict across several places: contract
//! results carry `@`-separated return data, the VM emits `signalError` and
//! `writeLog` events, and older nodes base64-encode event topics while newer
//! ones send them raw. The parser hides all of that behind one precedence
//! chain; the first matching rule wins.

use base64::Engine;

use crate::types::{Event, FullTransaction};

/// Event identifier emitted by the VM to convey return data.
pub const WRITE_LOG_IDENTIFIER: &str = "writeLog";
/// Event identifier emitted by the VM on a user error.
pub const SIGNAL_ERROR_IDENTIFIER: &str = "signalError";
/// Warning prefix a write-log carries when the caller overpaid gas.
pub const TOO_MUCH_GAS_PREFIX: &str = "@too much gas provided for processing";

/// Abstract verdict of a contract invocation; distinct from HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Ok,
    FunctionNotFound,
    FunctionWrongSignature,
    ContractNotFound,
    UserError,
    OutOfGas,
    AccountCollision,
    OutOfFunds,
    CallStackOverflow,
    ContractInvalid,
    ExecutionFailed,
    Unknown,
}

impl ReturnCode {
    /// Maps the ASCII status word found in return data to a return code.
    #[must_use]
    pub fn from_status_word(word: &str) -> Self {
        match word {
            "ok" => Self::Ok,
            "function not found" => Self::FunctionNotFound,
            "wrong signature for function" => Self::FunctionWrongSignature,
            "contract not found" => Self::ContractNotFound,
            "user error" => Self::UserError,
            "out of gas" => Self::OutOfGas,
            "account collision" => Self::AccountCollision,
            "out of funds" => Self::OutOfFunds,
            "call stack overflow" => Self::CallStackOverflow,
            "contract invalid" => Self::ContractInvalid,
            "execution failed" => Self::ExecutionFailed,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::FunctionNotFound => "function not found",
            Self::FunctionWrongSignature => "wrong signature for function",
            Self::ContractNotFound => "contract not found",
            Self::UserError => "user error",
            Self::OutOfGas => "out of gas",
            Self::AccountCollision => "account collision",
            Self::OutOfFunds => "out of funds",
            Self::CallStackOverflow => "call stack overflow",
            Self::ContractInvalid => "contract invalid",
            Self::ExecutionFailed => "execution failed",
            Self::Unknown => "unknown",
        }
    }
}

/// Structured outcome of a contract invocation.
///
/// `values` holds the contract's returned chunks in declared order, exactly
/// as they appeared after the status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub return_code: ReturnCode,
    pub return_message: String,
    pub values: Vec<Vec<u8>>,
}

/// Parser handle injected into processors.
///
/// The parser is pure; the handle exists so processors receive it through
/// their constructors like the other capabilities.
#[derive(Default)]
pub struct OutcomeParser;

impl OutcomeParser {
    /// See [`parse_outcome`].
    #[must_use]
    pub fn parse(&self, tx: &FullTransaction) -> Option<Outcome> {
        parse_outcome(tx)
    }
}

/// Parses the outcome of `tx`, or `None` when it cannot be determined from
/// the available results and logs. The caller decides whether an
/// undeterminable outcome is an error.
#[must_use]
pub fn parse_outcome(tx: &FullTransaction) -> Option<Outcome> {
    if let Some(outcome) = outcome_from_contract_results(tx) {
        return Some(outcome);
    }
    if let Some(outcome) = outcome_from_signal_error(tx) {
        return Some(outcome);
    }
    if let Some(outcome) = outcome_from_sender_write_log(tx) {
        return Some(outcome);
    }
    outcome_from_too_much_gas(tx)
}

/// Rule 1: a contract result whose data starts with `@` and a hex status
/// word.
fn outcome_from_contract_results(tx: &FullTransaction) -> Option<Outcome> {
    for result in &tx.sc_results {
        let Some((token, values)) = split_return_data(&result.data) else {
            continue;
        };
        let Some(word) = decode_status_word(&token) else {
            continue;
        };

        return Some(Outcome {
            return_code: ReturnCode::from_status_word(&word),
            return_message: result.return_message.clone(),
            values,
        });
    }
    None
}

/// Rule 2: a `signalError` event. The first topic is the human-readable
/// message; the status token in the data is ignored, user error wins.
fn outcome_from_signal_error(tx: &FullTransaction) -> Option<Outcome> {
    let event = find_event(tx, |e| e.identifier == SIGNAL_ERROR_IDENTIFIER)?;

    let return_message = event
        .topics
        .first()
        .map(|topic| String::from_utf8_lossy(&decode_topic(topic)).into_owned())
        .unwrap_or_default();

    let values = event
        .data
        .as_deref()
        .and_then(split_return_data)
        .map(|(_, values)| values)
        .unwrap_or_default();

    Some(Outcome { return_code: ReturnCode::UserError, return_message, values })
}

/// Rule 3: a `writeLog` event whose first topic equals the transaction
/// sender.
fn outcome_from_sender_write_log(tx: &FullTransaction) -> Option<Outcome> {
    let event = find_event(tx, |e| {
        e.identifier == WRITE_LOG_IDENTIFIER &&
            e.topics.first().is_some_and(|topic| decode_topic(topic) == tx.sender.as_bytes())
    })?;

    let values = event
        .data
        .as_deref()
        .and_then(split_return_data)
        .map(|(_, values)| values)
        .unwrap_or_default();

    Some(Outcome { return_code: ReturnCode::Ok, return_message: String::new(), values })
}

/// Rule 4: a `writeLog` event carrying the too-much-gas warning.
fn outcome_from_too_much_gas(tx: &FullTransaction) -> Option<Outcome> {
    let event = find_event(tx, |e| {
        e.identifier == WRITE_LOG_IDENTIFIER &&
            e.topics.iter().any(|topic| topic_has_gas_warning(topic))
    })?;

    let warning = event
        .topics
        .iter()
        .find(|topic| topic_has_gas_warning(topic))
        .map(|topic| String::from_utf8_lossy(&decode_topic(topic)).into_owned())?;

    Some(Outcome { return_code: ReturnCode::Ok, return_message: warning, values: Vec::new() })
}

fn topic_has_gas_warning(topic: &str) -> bool {
    String::from_utf8_lossy(&decode_topic(topic)).starts_with(TOO_MUCH_GAS_PREFIX)
}

fn find_event<'a>(
    tx: &'a FullTransaction,
    predicate: impl Fn(&Event) -> bool,
) -> Option<&'a Event> {
    tx.logs.as_ref().and_then(|logs| logs.events.iter().find(|e| predicate(e)))
}

/// Splits `@`-separated return data into the status token and the raw value
/// chunks. Returns `None` when the data does not start with `@`.
fn split_return_data(data: &str) -> Option<(String, Vec<Vec<u8>>)> {
    let rest = data.strip_prefix('@')?;
    let mut parts = rest.split('@');
    let token = parts.next().unwrap_or_default().to_string();
    let values = parts.map(|chunk| chunk.as_bytes().to_vec()).collect();
    Some((token, values))
}

/// Hex-decodes the status token into its ASCII word, or `None` when the
/// token is not clean hex.
fn decode_status_word(token: &str) -> Option<String> {
    let bytes = hex::decode(token).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Topic bytes arrive base64-encoded or raw depending on the observer
/// version. Base64 is preferred when it decodes cleanly to printable text.
fn decode_topic(topic: &str) -> Vec<u8> {
    if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(topic) {
        let printable = decoded
            .iter()
            .all(|b| b.is_ascii_graphic() || *b == b' ');
        if printable && !decoded.is_empty() {
            return decoded;
        }
    }
    topic.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiLogs, SmartContractResult};

    const SENDER: &str = "erd1qyu5wthldzr8wx5c9ucg8kjagg0jfs53s8nr3zpz3hypefsdd8ssycr6th";

    fn tx_with_events(events: Vec<Event>) -> FullTransaction {
        FullTransaction {
            sender: SENDER.to_string(),
            logs: Some(ApiLogs { address: SENDER.to_string(), events }),
            ..FullTransaction::default()
        }
    }

    #[test]
    fn parses_easily_found_return_data_in_contract_results() {
        let tx = FullTransaction {
            sc_results: vec![SmartContractResult {
                nonce: 42,
                data: "@6f6b@03".to_string(),
                return_message: "foobar".to_string(),
                ..SmartContractResult::default()
            }],
            ..FullTransaction::default()
        };

        let outcome = parse_outcome(&tx).unwrap();
        assert_eq!(outcome.return_code, ReturnCode::Ok);
        assert_eq!(outcome.return_message, "foobar");
        assert_eq!(outcome.values, vec![b"03".to_vec()]);
    }

    #[test]
    fn parses_signal_error_event() {
        let tx = tx_with_events(vec![Event {
            identifier: SIGNAL_ERROR_IDENTIFIER.to_string(),
            topics: vec!["something happened".to_string()],
            data: Some("@75736572206572726f72@07".to_string()),
            ..Event::default()
        }]);

        let outcome = parse_outcome(&tx).unwrap();
        assert_eq!(outcome.return_code, ReturnCode::UserError);
        assert_eq!(outcome.return_message, "something happened");
        assert_eq!(outcome.values, vec![b"07".to_vec()]);
    }

    #[test]
    fn parses_too_much_gas_warning() {
        let warning = "@too much gas provided for processing: gas provided = 596384500, gas used = 733010";
        let tx = tx_with_events(vec![Event {
            identifier: WRITE_LOG_IDENTIFIER.to_string(),
            topics: vec![warning.to_string()],
            data: Some("@6f6b".to_string()),
            ..Event::default()
        }]);

        let outcome = parse_outcome(&tx).unwrap();
        assert_eq!(outcome.return_code, ReturnCode::Ok);
        assert_eq!(outcome.return_message, warning);
        assert!(outcome.values.is_empty());
    }

    #[test]
    fn parses_write_log_with_base64_sender_topic() {
        let topic = base64::engine::general_purpose::STANDARD.encode(SENDER);
        let tx = tx_with_events(vec![Event {
            identifier: WRITE_LOG_IDENTIFIER.to_string(),
            topics: vec![topic],
            data: Some("@6f6b=".to_string()),
            ..Event::default()
        }]);

        let outcome = parse_outcome(&tx).unwrap();
        assert_eq!(outcome.return_code, ReturnCode::Ok);
        assert!(outcome.return_message.is_empty());
        assert!(outcome.values.is_empty());
    }

    #[test]
    fn contract_results_take_precedence_over_events() {
        let mut tx = tx_with_events(vec![Event {
            identifier: SIGNAL_ERROR_IDENTIFIER.to_string(),
            topics: vec!["boom".to_string()],
            data: None,
            ..Event::default()
        }]);
        tx.sc_results = vec![SmartContractResult {
            data: "@6f7574206f6620676173".to_string(),
            ..SmartContractResult::default()
        }];

        let outcome = parse_outcome(&tx).unwrap();
        assert_eq!(outcome.return_code, ReturnCode::OutOfGas);
    }

    #[test]
    fn unknown_status_word_maps_to_unknown() {
        // hex of "weird verdict"
        let tx = FullTransaction {
            sc_results: vec![SmartContractResult {
                data: "@77656972642076657264696374".to_string(),
                ..SmartContractResult::default()
            }],
            ..FullTransaction::default()
        };

        assert_eq!(parse_outcome(&tx).unwrap().return_code, ReturnCode::Unknown);
    }

    #[test]
    fn contract_result_without_marker_is_skipped() {
        let tx = FullTransaction {
            sc_results: vec![
                SmartContractResult {
                    data: "transfer@1234".to_string(),
                    ..SmartContractResult::default()
                },
                SmartContractResult {
                    data: "@6f6b".to_string(),
                    ..SmartContractResult::default()
                },
            ],
            ..FullTransaction::default()
        };

        assert_eq!(parse_outcome(&tx).unwrap().return_code, ReturnCode::Ok);
    }

    #[test]
    fn undeterminable_outcome_is_none() {
        assert!(parse_outcome(&FullTransaction::default()).is_none());

        let tx = tx_with_events(vec![Event {
            identifier: WRITE_LOG_IDENTIFIER.to_string(),
            topics: vec!["unrelated".to_string()],
            data: None,
            ..Event::default()
        }]);
        assert!(parse_outcome(&tx).is_none());
    }

    #[test]
    fn status_word_table() {
        assert_eq!(ReturnCode::from_status_word("ok"), ReturnCode::Ok);
        assert_eq!(ReturnCode::from_status_word("function not found"), ReturnCode::FunctionNotFound);
        assert_eq!(
            ReturnCode::from_status_word("wrong signature for function"),
            ReturnCode::FunctionWrongSignature
        );
        assert_eq!(ReturnCode::from_status_word("contract not found"), ReturnCode::ContractNotFound);
        assert_eq!(ReturnCode::from_status_word("user error"), ReturnCode::UserError);
        assert_eq!(ReturnCode::from_status_word("out of gas"), ReturnCode::OutOfGas);
        assert_eq!(ReturnCode::from_status_word("account collision"), ReturnCode::AccountCollision);
        assert_eq!(ReturnCode::from_status_word("out of funds"), ReturnCode::OutOfFunds);
        assert_eq!(
            ReturnCode::from_status_word("call stack overflow"),
            ReturnCode::CallStackOverflow
        );
        assert_eq!(ReturnCode::from_status_word("contract invalid"), ReturnCode::ContractInvalid);
        assert_eq!(ReturnCode::from_status_word("execution failed"), ReturnCode::ExecutionFailed);
        assert_eq!(ReturnCode::from_status_word("anything else"), ReturnCode::Unknown);
    }
}
