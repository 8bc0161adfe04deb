/*
 * Duplicate resolution: deciding what create_login does when the name it
 * is about to write already exists, and who gets asked when that is not
 * obvious.
 */
use crate::errors::{Error, Result};
use appseed_api as api;
use api::{CredentialRecord, DuplicateStrategy};

/* What the store should do with a login it was asked to write */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create,
    Edit(String),
    Duplicate,
    Skip(String),
    Ask,
}

pub fn decide(existing: Option<&CredentialRecord>, strategy: DuplicateStrategy) -> Action {
    let Some(record) = existing else {
	return Action::Create;
    };

    match strategy {
	DuplicateStrategy::Edit => Action::Edit(record.id.clone()),
	DuplicateStrategy::Duplicate => Action::Duplicate,
	DuplicateStrategy::NoAction => Action::Skip(record.id.clone()),
	DuplicateStrategy::Ask => Action::Ask,
    }
}

/* The answer to a disambiguation question */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    // index into the candidates that were offered
    pub selected: usize,

    // never Ask
    pub strategy: DuplicateStrategy,

    // "always do this": becomes the session default
    pub always: bool,
}

/*
 * Decides between candidates sharing a name. Called with one candidate
 * when the strategy is `ask`, with several whenever a lookup is
 * ambiguous.
 */
pub trait DisambiguationPolicy: Send + Sync {
    fn disambiguate(&self, name: &str, candidates: &[CredentialRecord]) -> Result<Choice>;
}

/*
 * Non-interactive policy: answers single-match questions with a fixed
 * strategy and refuses to pick between several candidates.
 */
pub struct HeadlessPolicy {
    strategy: DuplicateStrategy,
}

impl HeadlessPolicy {
    pub fn new(strategy: DuplicateStrategy) -> Self {
	// asking nobody would loop forever
	let strategy = match strategy {
	    DuplicateStrategy::Ask => DuplicateStrategy::NoAction,
	    other => other,
	};
	Self{ strategy }
    }
}

impl DisambiguationPolicy for HeadlessPolicy {
    fn disambiguate(&self, name: &str, candidates: &[CredentialRecord]) -> Result<Choice> {
	if candidates.len() != 1 {
	    return Err(Error::Ambiguous{
		name: name.to_string(),
		candidates: candidates.iter().map(|c| c.id.clone()).collect(),
	    });
	}

	Ok(Choice{ selected: 0, strategy: self.strategy, always: false })
    }
}

/* Asks on the terminal */
pub struct PromptPolicy;

const STRATEGIES: [DuplicateStrategy; 3] = [
    DuplicateStrategy::Edit,
    DuplicateStrategy::Duplicate,
    DuplicateStrategy::NoAction,
];

fn describe(record: &CredentialRecord) -> String {
    let url = record.item_url.as_deref().unwrap_or("-");
    format!("{} | user: {} | url: {} | id: {}", record.name, record.user, url, record.id)
}

impl DisambiguationPolicy for PromptPolicy {
    fn disambiguate(&self, name: &str, candidates: &[CredentialRecord]) -> Result<Choice> {
	let selected = match candidates.len() {
	    0 => return Err(Error::Other(format!("nothing to choose from for '{}'", name))),
	    1 => 0,
	    _ => {
		let options: Vec<String> = candidates.iter().map(describe).collect();
		let message = format!("Found {} vault items named '{}', which one should be used?", candidates.len(), name);
		inquire::Select::new(&message, options).raw_prompt()?.index
	    }
	};

	let message = format!("'{}' already exists ({}), what should happen?", name, candidates[selected].id);
	let strategy = inquire::Select::new(&message, STRATEGIES.to_vec()).prompt()?;

	let always = inquire::Confirm::new("Always do this for existing items?")
	    .with_default(false)
	    .prompt()?;

	Ok(Choice{ selected, strategy, always })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(id: &str) -> CredentialRecord {
	CredentialRecord{
	    id: id.to_string(),
	    name: String::from("nextcloud-admin-credentials"),
	    ..Default::default()
	}
    }

    #[test]
    fn missing_record_is_always_created() {
	for strategy in [DuplicateStrategy::Edit, DuplicateStrategy::Ask, DuplicateStrategy::Duplicate, DuplicateStrategy::NoAction] {
	    assert_eq!(decide(None, strategy), Action::Create);
	}
    }

    #[test]
    fn existing_record_follows_strategy() {
	let existing = record("id-1");

	assert_eq!(decide(Some(&existing), DuplicateStrategy::Edit), Action::Edit(String::from("id-1")));
	assert_eq!(decide(Some(&existing), DuplicateStrategy::NoAction), Action::Skip(String::from("id-1")));
	assert_eq!(decide(Some(&existing), DuplicateStrategy::Duplicate), Action::Duplicate);
	assert_eq!(decide(Some(&existing), DuplicateStrategy::Ask), Action::Ask);
    }

    #[test]
    fn headless_refuses_to_pick_between_candidates() {
	let policy = HeadlessPolicy::new(DuplicateStrategy::Edit);
	let err = policy.disambiguate("n", &[record("a"), record("b")]).unwrap_err();

	match err {
	    Error::Ambiguous{ name, candidates } => {
		assert_eq!(name, "n");
		assert_eq!(candidates, vec![String::from("a"), String::from("b")]);
	    },
	    other => panic!("unexpected error {:?}", other),
	}
    }

    #[test]
    fn headless_never_answers_ask() {
	let policy = HeadlessPolicy::new(DuplicateStrategy::Ask);
	let choice = policy.disambiguate("n", &[record("a")]).unwrap();

	assert_eq!(choice.strategy, DuplicateStrategy::NoAction);
	assert!(!choice.always);
    }
}
