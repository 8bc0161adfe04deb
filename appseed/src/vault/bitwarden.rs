use crate::errors::{Error, Result};
use crate::vault::{Lookup, Release, VaultClient};
use appseed_api as api;
use api::{CredentialRecord, CustomField, VaultStatus};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use tokio::process::Command;

const NOT_FOUND: &str = "Not found.";
const MULTIPLE_FOUND: &str = "More than one result was found";
const PASSWORD_LENGTH: &str = "32";

/*
 * Bitwarden item as the CLI reads and writes it (`bw get template item`).
 */
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BwItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    organization_id: Option<String>,

    #[serde(default)]
    collection_ids: Vec<String>,

    folder_id: Option<String>,

    // 1 = login
    #[serde(rename = "type")]
    type_: u8,

    name: String,

    notes: Option<String>,

    #[serde(default)]
    favorite: bool,

    #[serde(default)]
    fields: Vec<BwField>,

    #[serde(default)]
    login: BwLogin,

    #[serde(default)]
    reprompt: u8,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct BwField {
    name: String,

    #[serde(default)]
    value: Option<String>,

    // 0 = text
    #[serde(rename = "type", default)]
    type_: u8,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct BwLogin {
    #[serde(default)]
    uris: Vec<BwUri>,
    username: Option<String>,
    password: Option<String>,
    totp: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct BwUri {
    #[serde(rename = "match")]
    match_: Option<u8>,
    uri: String,
}

/* envelope of every `--response` call */
#[derive(Debug, Deserialize)]
struct BwResponse {
    success: bool,
    message: Option<String>,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BwStatus {
    status: VaultStatus,
}

impl From<BwItem> for CredentialRecord {
    fn from(item: BwItem) -> Self {
	let fields = item.fields.into_iter()
	    .map(|f| CustomField{ name: f.name, value: f.value.unwrap_or_default() })
	    .collect();

	CredentialRecord{
	    id: item.id.unwrap_or_default(),
	    name: item.name,
	    item_url: item.login.uris.into_iter().next().map(|u| u.uri),
	    user: item.login.username.unwrap_or_default(),
	    password: item.login.password.unwrap_or_default(),
	    custom_fields: fields,
	    org: item.organization_id,
	    collection: item.collection_ids.into_iter().next(),
	}
    }
}

impl From<&CredentialRecord> for BwItem {
    fn from(record: &CredentialRecord) -> Self {
	let id = match record.id.is_empty() {
	    true => None,
	    false => Some(record.id.clone()),
	};
	let uris = record.item_url.iter()
	    .map(|uri| BwUri{ match_: None, uri: uri.clone() })
	    .collect();
	let fields = record.custom_fields.iter()
	    .map(|f| BwField{ name: f.name.clone(), value: Some(f.value.clone()), type_: 0 })
	    .collect();

	BwItem{
	    id,
	    organization_id: record.org.clone(),
	    collection_ids: record.collection.iter().cloned().collect(),
	    folder_id: None,
	    type_: 1,
	    name: record.name.clone(),
	    notes: None,
	    favorite: false,
	    fields,
	    login: BwLogin{
		uris,
		username: Some(record.user.clone()),
		password: Some(record.password.clone()),
		totp: None,
	    },
	    reprompt: 0,
	}
    }
}

/* the CLI takes item payloads as base64 encoded JSON, like `bw encode` */
fn encode<T: Serialize>(item: &T) -> Result<String> {
    let json = serde_json::to_vec(item)?;
    Ok(BASE64.encode(json))
}

/*
 * Writes the login username/password and the custom field values of
 * `record` into the item exactly as the vault returned it. Everything else
 * (notes, folder, totp, uris, ...) is left alone, and a field that already
 * exists keeps its type.
 */
fn patch_item(mut item: Value, record: &CredentialRecord) -> Result<Value> {
    let Some(object) = item.as_object_mut() else {
	return Err(Error::Vault(String::from("vault item is not an object")));
    };

    let existing = match object.remove("fields") {
	Some(Value::Array(fields)) => fields,
	_ => vec![],
    };
    let fields: Vec<Value> = record.custom_fields.iter()
	.map(|field| {
	    let known = existing.iter()
		.find(|f| f.get("name").and_then(Value::as_str) == Some(field.name.as_str()))
		.cloned();
	    match known {
		Some(mut known) => {
		    known["value"] = Value::String(field.value.clone());
		    known
		},
		None => serde_json::json!({ "name": field.name, "value": field.value, "type": 0 }),
	    }
	})
	.collect();
    object.insert(String::from("fields"), Value::Array(fields));

    let login = object.entry("login").or_insert_with(|| Value::Object(Default::default()));
    let Some(login) = login.as_object_mut() else {
	return Err(Error::Vault(String::from("vault item has no login")));
    };
    login.insert(String::from("username"), Value::String(record.user.clone()));
    login.insert(String::from("password"), Value::String(record.password.clone()));

    Ok(item)
}

fn parse_response(stdout: &[u8]) -> Result<BwResponse> {
    let response: BwResponse = serde_json::from_slice(stdout)
	.map_err(|err| Error::Vault(format!("unexpected vault response: {}", err)))?;
    Ok(response)
}

fn parse_record(response: BwResponse) -> Result<CredentialRecord> {
    if !response.success {
	return Err(Error::Vault(response.message.unwrap_or_default()));
    }

    let data = response.data
	.ok_or_else(|| Error::Vault(String::from("vault response carries no item")))?;
    let item: BwItem = serde_json::from_value(data)?;
    Ok(item.into())
}

/*
 * A lookup either returns the item, "Not found.", or the multiplicity
 * message listing the ids that matched.
 */
fn parse_lookup(response: BwResponse) -> Result<Lookup> {
    if response.success {
	return parse_record(response).map(Lookup::Single);
    }

    let message = response.message.unwrap_or_default();
    if message.trim() == NOT_FOUND {
	return Ok(Lookup::NotFound);
    }

    if !message.contains(MULTIPLE_FOUND) {
	return Err(Error::Vault(message));
    }

    let ids = match response.data {
	Some(Value::Array(ids)) => ids.into_iter()
	    .filter_map(|id| match id {
		Value::String(id) => Some(id),
		Value::Object(obj) => obj.get("id").and_then(|i| i.as_str()).map(String::from),
		_ => None,
	    })
	    .collect(),
	_ => message.lines()
	    .skip(1)
	    .map(str::trim)
	    .filter(|line| !line.is_empty() && !line.contains(' '))
	    .map(String::from)
	    .collect(),
    };

    Ok(Lookup::Multiple(ids))
}

/*
 * Talks to Bitwarden through its `bw` command line client.
 */
#[derive(Clone, Debug)]
pub struct BitwardenCli {
    binary: String,
}

impl BitwardenCli {

    /* fails with Error::ToolMissing when the binary is not installed */
    pub async fn locate(binary: &str) -> Result<Self> {
	let cli = Self{ binary: binary.to_string() };
	let version = cli.capture(&["--version"], None).await?;
	log::debug!("Using {} {}", binary, String::from_utf8_lossy(&version.stdout).trim());

	Ok(cli)
    }

    fn command(&self, args: &[&str], token: Option<&str>) -> Command {
	let mut command = Command::new(&self.binary);
	command.args(args);
	if let Some(token) = token {
	    command.env("BW_SESSION", token);
	}
	command
    }

    fn spawn_error(&self, err: std::io::Error) -> Error {
	match err.kind() {
	    ErrorKind::NotFound => Error::ToolMissing(self.binary.clone()),
	    _ => Error::Io(err),
	}
    }

    /* run without a terminal, stdout/stderr captured */
    async fn capture(&self, args: &[&str], token: Option<&str>) -> Result<Output> {
	let mut command = self.command(args, token);
	command.stdin(Stdio::null());
	command.output().await.map_err(|err| self.spawn_error(err))
    }

    /* run with the terminal attached so the CLI can prompt */
    async fn interactive(&self, args: &[&str]) -> Result<Output> {
	let mut command = self.command(args, None);
	command.stdin(Stdio::inherit())
	    .stderr(Stdio::inherit())
	    .stdout(Stdio::piped());
	command.output().await.map_err(|err| self.spawn_error(err))
    }

    async fn checked(&self, args: &[&str], token: Option<&str>) -> Result<String> {
	let output = self.capture(args, token).await?;
	if !output.status.success() {
	    let stderr = String::from_utf8_lossy(&output.stderr);
	    return Err(Error::Vault(format!("`{} {}` failed: {}", self.binary, args.join(" "), stderr.trim())));
	}
	Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn respond(&self, args: &[&str], token: &str) -> Result<BwResponse> {
	let mut args = args.to_vec();
	args.push("--response");

	// --response reports failures in the body, the exit code adds nothing
	let output = self.capture(&args, Some(token)).await?;
	parse_response(&output.stdout)
    }
}

fn has_env(name: &str) -> bool {
    std::env::var(name).map_or(false, |v| !v.is_empty())
}

#[async_trait]
impl VaultClient for BitwardenCli {

    async fn status(&self) -> Result<VaultStatus> {
	let stdout = self.checked(&["status"], None).await?;
	let status: BwStatus = serde_json::from_str(&stdout)?;
	Ok(status.status)
    }

    async fn login(&self) -> Result<()> {
	let output = if has_env("BW_CLIENTID") && has_env("BW_CLIENTSECRET") {
	    self.capture(&["login", "--apikey"], None).await?
	} else {
	    self.interactive(&["login"]).await?
	};

	if !output.status.success() {
	    return Err(Error::Vault(format!("login failed: {}", String::from_utf8_lossy(&output.stderr).trim())));
	}
	Ok(())
    }

    async fn unlock(&self) -> Result<String> {
	let output = if has_env("BW_PASSWORD") {
	    self.capture(&["unlock", "--passwordenv", "BW_PASSWORD", "--raw"], None).await?
	} else {
	    self.interactive(&["unlock", "--raw"]).await?
	};

	let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
	if !output.status.success() || token.is_empty() {
	    return Err(Error::Vault(String::from("unable to unlock the vault")));
	}
	Ok(token)
    }

    async fn lock(&self, token: &str) -> Result<()> {
	self.checked(&["lock"], Some(token)).await?;
	Ok(())
    }

    fn release(&self, token: &str) -> Option<Release> {
	let binary = self.binary.clone();
	let token = token.to_string();

	Some(Box::new(move || {
	    let status = std::process::Command::new(&binary)
		.arg("lock")
		.env("BW_SESSION", &token)
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.status();
	    if let Err(err) = status {
		log::error!("Unable to lock the vault: {}", err);
	    }
	}))
    }

    async fn generate(&self, token: &str, special_characters: bool) -> Result<String> {
	let mut args = vec!["generate", "--uppercase", "--lowercase", "--number", "--length", PASSWORD_LENGTH];
	if special_characters {
	    args.push("--special");
	}
	self.checked(&args, Some(token)).await
    }

    async fn find(&self, token: &str, name: &str) -> Result<Lookup> {
	let response = self.respond(&["get", "item", name], token).await?;
	parse_lookup(response)
    }

    async fn get(&self, token: &str, id: &str) -> Result<CredentialRecord> {
	let response = self.respond(&["get", "item", id], token).await?;
	parse_record(response)
    }

    async fn create(&self, token: &str, record: &CredentialRecord) -> Result<CredentialRecord> {
	let payload = encode(&BwItem::from(record))?;
	let response = self.respond(&["create", "item", payload.as_str()], token).await?;
	parse_record(response)
    }

    async fn edit(&self, token: &str, id: &str, record: &CredentialRecord) -> Result<CredentialRecord> {
	let response = self.respond(&["get", "item", id], token).await?;
	if !response.success {
	    return Err(Error::Vault(response.message.unwrap_or_default()));
	}
	let current = response.data
	    .ok_or_else(|| Error::Vault(format!("vault returned no item for {}", id)))?;

	let payload = encode(&patch_item(current, record)?)?;
	let response = self.respond(&["edit", "item", id, payload.as_str()], token).await?;
	parse_record(response)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> BwResponse {
	parse_response(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn single_match_is_converted_to_a_record() {
	let found = parse_lookup(response(json!({
	    "success": true,
	    "data": {
		"object": "item",
		"id": "6b1c",
		"organizationId": null,
		"collectionIds": ["c1"],
		"folderId": null,
		"type": 1,
		"name": "nextcloud-admin-credentials cloud.example.com",
		"fields": [{ "name": "smtp_host", "value": "mail.example.com", "type": 0 }],
		"login": {
		    "uris": [{ "match": null, "uri": "cloud.example.com" }],
		    "username": "admin",
		    "password": "hunter2",
		    "totp": null
		}
	    }
	}))).unwrap();

	let Lookup::Single(record) = found else { panic!("expected a single match") };
	assert_eq!(record.id, "6b1c");
	assert_eq!(record.item_url.as_deref(), Some("cloud.example.com"));
	assert_eq!(record.user, "admin");
	assert_eq!(record.password, "hunter2");
	assert_eq!(record.field("smtp_host"), Some("mail.example.com"));
	assert_eq!(record.collection.as_deref(), Some("c1"));
    }

    #[test]
    fn not_found_is_not_an_error() {
	let found = parse_lookup(response(json!({ "success": false, "message": "Not found." }))).unwrap();
	assert_eq!(found, Lookup::NotFound);
    }

    #[test]
    fn multiple_matches_from_data() {
	let found = parse_lookup(response(json!({
	    "success": false,
	    "message": "More than one result was found. Try getting a specific object by `id` instead.",
	    "data": ["id-1", "id-2"]
	}))).unwrap();

	assert_eq!(found, Lookup::Multiple(vec![String::from("id-1"), String::from("id-2")]));
    }

    #[test]
    fn multiple_matches_from_message() {
	let message = "More than one result was found. Try getting a specific object by `id` instead. \
		       The following objects were found:\nid-1\nid-2\n";
	let found = parse_lookup(response(json!({ "success": false, "message": message }))).unwrap();

	assert_eq!(found, Lookup::Multiple(vec![String::from("id-1"), String::from("id-2")]));
    }

    #[test]
    fn other_failures_are_vault_errors() {
	let err = parse_lookup(response(json!({ "success": false, "message": "Vault is locked." }))).unwrap_err();
	assert!(matches!(err, Error::Vault(ref m) if m == "Vault is locked."));
    }

    #[test]
    fn payload_is_base64_json_of_a_login_item() {
	let record = CredentialRecord{
	    name: String::from("app-admin-credentials app.example.com"),
	    item_url: Some(String::from("app.example.com")),
	    user: String::from("admin"),
	    password: String::from("pw"),
	    custom_fields: vec![CustomField::new("token", "t")],
	    ..Default::default()
	};

	let decoded = BASE64.decode(encode(&BwItem::from(&record)).unwrap()).unwrap();
	let item: Value = serde_json::from_slice(&decoded).unwrap();

	assert_eq!(item["type"], 1);
	assert!(item.get("id").is_none());
	assert_eq!(item["name"], "app-admin-credentials app.example.com");
	assert_eq!(item["login"]["username"], "admin");
	assert_eq!(item["login"]["uris"][0]["uri"], "app.example.com");
	assert_eq!(item["fields"][0]["name"], "token");
	assert_eq!(item["fields"][0]["value"], "t");
    }

    #[test]
    fn edits_only_touch_login_and_field_values() {
	let current = json!({
	    "object": "item",
	    "id": "6b1c",
	    "folderId": "f1",
	    "type": 1,
	    "name": "nextcloud-admin-credentials cloud.example.com",
	    "notes": "recovery codes: 1234",
	    "favorite": true,
	    "fields": [
		{ "name": "api_key", "value": "old", "type": 1 },
		{ "name": "dropped", "value": "x", "type": 0 }
	    ],
	    "login": {
		"uris": [
		    { "match": null, "uri": "cloud.example.com" },
		    { "match": 3, "uri": "https://cloud.example.com/login" }
		],
		"username": "admin",
		"password": "old-password",
		"totp": "otpauth://totp/nextcloud"
	    },
	    "reprompt": 1
	});
	let record = CredentialRecord{
	    id: String::from("6b1c"),
	    name: String::from("nextcloud-admin-credentials cloud.example.com"),
	    item_url: Some(String::from("cloud.example.com")),
	    user: String::from("root"),
	    password: String::from("new-password"),
	    custom_fields: vec![CustomField::new("api_key", "new"), CustomField::new("smtp_host", "mail.example.com")],
	    ..Default::default()
	};

	let decoded = BASE64.decode(encode(&patch_item(current, &record).unwrap()).unwrap()).unwrap();
	let item: Value = serde_json::from_slice(&decoded).unwrap();

	assert_eq!(item["login"]["username"], "root");
	assert_eq!(item["login"]["password"], "new-password");
	assert_eq!(item["notes"], "recovery codes: 1234");
	assert_eq!(item["folderId"], "f1");
	assert_eq!(item["favorite"], true);
	assert_eq!(item["reprompt"], 1);
	assert_eq!(item["login"]["totp"], "otpauth://totp/nextcloud");
	assert_eq!(item["login"]["uris"].as_array().unwrap().len(), 2);
	assert_eq!(item["fields"], json!([
	    { "name": "api_key", "value": "new", "type": 1 },
	    { "name": "smtp_host", "value": "mail.example.com", "type": 0 }
	]));
    }

    #[test]
    fn non_object_items_are_rejected() {
	let err = patch_item(json!(["6b1c"]), &CredentialRecord::default()).unwrap_err();
	assert!(matches!(err, Error::Vault(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_reported_as_such() {
	let err = BitwardenCli::locate("appseed-no-such-vault-binary").await.unwrap_err();
	assert!(matches!(err, Error::ToolMissing(ref b) if b == "appseed-no-such-vault-binary"));
    }
}
