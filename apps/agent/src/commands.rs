//! One command per stdin line, one JSON document per stdout line.
//!
//! A bare line is an entry scan. Prefixed lines:
//! `exit <secret>`, `force <secret>`, `unpaid <secret>`,
//! `answer <nonce> <question>=<text>[;...] <secret>`, `search <query>`,
//! `status`, `sync`, `outcomes`.

use std::sync::Arc;

use serde_json::{json, Value};

use checkin_core::catalog::Answer;
use checkin_core::redemption::RedemptionRequest;
use checkin_core::uploads::UploadQueueRepositoryTrait;
use checkin_core::Result;

use crate::context::AgentContext;

const RECENT_OUTCOMES: i64 = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Redeem(RedemptionRequest),
    Search(String),
    Status,
    Sync,
    Outcomes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

pub fn parse_command(line: &str) -> Option<std::result::Result<Command, ParseError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match (word, rest.is_empty()) {
        ("status", true) => Ok(Command::Status),
        ("sync", true) => Ok(Command::Sync),
        ("outcomes", true) => Ok(Command::Outcomes),
        ("search", false) => Ok(Command::Search(rest.to_string())),
        ("exit", false) => Ok(Command::Redeem(RedemptionRequest::exit(rest))),
        ("force", false) => Ok(Command::Redeem(RedemptionRequest::entry(rest).forced())),
        ("unpaid", false) => Ok(Command::Redeem(
            RedemptionRequest::entry(rest).ignoring_unpaid(),
        )),
        ("answer", false) => parse_answers(rest),
        ("search" | "exit" | "force" | "unpaid" | "answer", true) => {
            Err(ParseError(format!("{word} needs an argument")))
        }
        _ => Ok(Command::Redeem(RedemptionRequest::entry(line))),
    };
    Some(command)
}

/// `<nonce> <question>=<text>[;<question>=<text>] <secret>`
fn parse_answers(rest: &str) -> std::result::Result<Command, ParseError> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let [nonce, answers, secret] = parts.as_slice() else {
        return Err(ParseError(
            "usage: answer <nonce> <question>=<text>[;...] <secret>".to_string(),
        ));
    };

    let answers = answers
        .split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (question, text) = pair
                .split_once('=')
                .ok_or_else(|| ParseError(format!("malformed answer '{pair}'")))?;
            let question_id = question
                .parse::<i64>()
                .map_err(|_| ParseError(format!("malformed question id '{question}'")))?;
            Ok(Answer::new(question_id, text))
        })
        .collect::<std::result::Result<Vec<_>, ParseError>>()?;

    Ok(Command::Redeem(
        RedemptionRequest::entry(*secret)
            .with_answers(answers)
            .continuing(*nonce),
    ))
}

pub async fn execute(context: &Arc<AgentContext>, command: Command) -> Result<Value> {
    let session = &context.session;
    match command {
        Command::Redeem(request) => {
            let result = context.validator.redeem(session, request).await?;
            Ok(serde_json::to_value(result)?)
        }
        Command::Search(query) => {
            let results = context
                .debouncer
                .search(Arc::clone(&context.validator), session.clone(), query)
                .await;
            match results {
                Some(results) => Ok(serde_json::to_value(results?)?),
                None => Ok(json!({ "superseded": true })),
            }
        }
        Command::Status => {
            let status = context.validator.check_in_list_status(session).await?;
            Ok(json!({
                "list": serde_json::to_value(status)?,
                "pendingUploads": context.uploads.pending_count()?,
                "pendingFailedCheckins": context.uploads.failed_checkin_count()?,
                "engine": serde_json::to_value(context.uploads.get_engine_status()?)?,
                "serverVersion": serde_json::to_value(context.sync.server_version())?,
            }))
        }
        Command::Sync => {
            let result = context.sync.run_cycle().await?;
            Ok(serde_json::to_value(result)?)
        }
        Command::Outcomes => {
            let outcomes = context.uploads.recent_outcomes(RECENT_OUTCOMES)?;
            Ok(serde_json::to_value(outcomes)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkin_core::catalog::CheckInType;

    fn parsed(line: &str) -> Command {
        parse_command(line)
            .expect("not blank")
            .expect("valid command")
    }

    #[test]
    fn bare_line_is_an_entry_scan() {
        let Command::Redeem(request) = parsed("  SECRET1 ") else {
            panic!("expected redeem");
        };
        assert_eq!(request, RedemptionRequest::entry("SECRET1"));
        assert!(parse_command("   ").is_none());
    }

    #[test]
    fn prefixes_select_the_request_flags() {
        let Command::Redeem(exit) = parsed("exit SECRET1") else {
            panic!("expected redeem");
        };
        assert_eq!(exit.checkin_type, CheckInType::Exit);

        assert_eq!(
            parsed("force SECRET1"),
            Command::Redeem(RedemptionRequest::entry("SECRET1").forced())
        );
        assert_eq!(parsed("search Ada Lovelace"), Command::Search("Ada Lovelace".to_string()));
        assert_eq!(parsed("status"), Command::Status);
    }

    #[test]
    fn answers_continue_an_incomplete_scan() {
        assert_eq!(
            parsed("answer n-1 5=yes;6=Berlin SECRET1"),
            Command::Redeem(
                RedemptionRequest::entry("SECRET1")
                    .with_answers(vec![Answer::new(5, "yes"), Answer::new(6, "Berlin")])
                    .continuing("n-1")
            )
        );
        assert!(matches!(
            parse_command("answer n-1 five=yes SECRET1"),
            Some(Err(_))
        ));
        assert!(matches!(parse_command("search"), Some(Err(_))));
    }
}
