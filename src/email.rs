use crate::error::EmailError;
use crate::models::Change;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use lettre::message::{header::ContentType, Mailbox};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rust_embed::RustEmbed;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

// Gabarits HTML embarqués dans le binaire.
#[derive(RustEmbed)]
#[folder = "templates/email/"]
#[include = "*.html"]
struct EmailTemplates;

pub fn load_template(name: &str) -> Result<String, EmailError> {
    let file = <EmailTemplates as RustEmbed>::get(name)
        .ok_or_else(|| EmailError::Template(format!("unknown template '{}'", name)))?;
    String::from_utf8(file.data.into_owned())
        .map_err(|e| EmailError::Template(format!("template '{}' is not UTF-8: {}", name, e)))
}

// Substitution positionnelle `{0}`, `{1}`… ; `{{` et `}}` donnent des accolades littérales.
pub fn format_template(template: &str, args: &[&dyn Display]) -> Result<String, EmailError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(d) if d.is_ascii_digit() => index.push(d),
                        _ => {
                            return Err(EmailError::Template(
                                "malformed placeholder in template".to_string(),
                            ))
                        }
                    }
                }
                let i: usize = index.parse().map_err(|_| {
                    EmailError::Template("empty placeholder in template".to_string())
                })?;
                let arg = args.get(i).ok_or_else(|| {
                    EmailError::Template(format!(
                        "placeholder {{{}}} has no argument ({} given)",
                        i,
                        args.len()
                    ))
                })?;
                out.push_str(&arg.to_string());
            }
            '}' => {
                return Err(EmailError::Template(
                    "unmatched '}' in template".to_string(),
                ))
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html_body: String,
}

fn mailbox(raw: &str) -> Result<Mailbox, EmailError> {
    Mailbox::from_str(raw).map_err(|e| EmailError::Address(format!("'{}': {}", raw, e)))
}

impl Email {
    // Construit le message lettre ; toute adresse invalide est rejetée ici.
    pub fn to_message(&self) -> Result<Message, EmailError> {
        if self.to.is_empty() {
            return Err(EmailError::Build("message has no recipient".to_string()));
        }

        let from = mailbox(&self.from)?;
        let mut builder = Message::builder()
            .from(from.clone())
            .sender(from)
            .subject(self.subject.clone())
            .header(ContentType::TEXT_HTML);

        for to in &self.to {
            builder = builder.to(mailbox(to)?);
        }
        for cc in &self.cc {
            builder = builder.cc(mailbox(cc)?);
        }
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(mailbox(reply_to)?);
        }

        builder
            .body(self.html_body.clone())
            .map_err(|e| EmailError::Build(e.to_string()))
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), EmailError>;
}

// SMTP simple, sans TLS ni authentification : relais interne.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            transport: AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(port)
                .build(),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), EmailError> {
        let message = email.to_message()?;
        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        Ok(())
    }
}

// Garde les messages en mémoire au lieu de les envoyer.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), EmailError> {
        email.to_message()?;
        self.sent
            .lock()
            .map_err(|_| EmailError::Transport("recording mailer poisoned".to_string()))?
            .push(email.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub sender_address: String,
    pub sender_name: String,
    pub reply_to: String,
    pub developer_addresses: Vec<String>,
    pub registration_page_url: String,
    pub password_reset_page_url: String,
}

impl EmailSettings {
    fn sender(&self) -> String {
        if self.sender_name.is_empty() {
            self.sender_address.clone()
        } else {
            format!("\"{}\" <{}>", self.sender_name, self.sender_address)
        }
    }
}

// Chiffres du rapport d'appel final : (attendus, présents) par catégorie, puis par état.
#[derive(Debug, Clone, Default)]
pub struct MusterReport {
    pub muster_day: NaiveDate,
    pub total: (u32, u32),
    pub officers: (u32, u32),
    pub enlisted: (u32, u32),
    pub civilians: (u32, u32),
    pub reservists: (u32, u32),
    pub contractors: (u32, u32),
    pub pep: (u32, u32),
    pub temporary_duty: u32,
    pub present: u32,
    pub authorized_absence: u32,
    pub tad: u32,
    pub leave: u32,
    pub terminal_leave: u32,
    pub deployed: u32,
    pub siq: u32,
    pub ua: u32,
    pub other: u32,
    pub unaccounted: u32,
    pub unaccounted_names: String,
}

pub struct EmailHelper {
    mailer: Arc<dyn Mailer>,
    settings: EmailSettings,
}

impl EmailHelper {
    pub fn new(mailer: Arc<dyn Mailer>, settings: EmailSettings) -> Self {
        Self { mailer, settings }
    }

    pub fn has_developers(&self) -> bool {
        !self.settings.developer_addresses.is_empty()
    }

    pub async fn send_failed_account_login(
        &self,
        to: &str,
        person_id: &str,
    ) -> Result<(), EmailError> {
        let body = format_template(
            &load_template("FailedAccountLogin.html")?,
            &[&now(), &person_id],
        )?;
        self.deliver(self.standard_message(vec![to.to_string()], "Failed Account Login", body))
            .await
    }

    // Seuls les quatre derniers chiffres du SSN apparaissent dans le message.
    pub async fn send_confirm_account(
        &self,
        to: &str,
        confirmation_id: &str,
        ssn: &str,
    ) -> Result<(), EmailError> {
        let link = format!("{}{}", self.settings.registration_page_url, confirmation_id);
        let body = format_template(
            &load_template("ConfirmAccount.html")?,
            &[&now(), &link, &ssn_excerpt(ssn)],
        )?;
        self.deliver(self.standard_message(vec![to.to_string()], "Confirm Email Address", body))
            .await
    }

    pub async fn send_final_muster_report(
        &self,
        to: &[String],
        report: &MusterReport,
    ) -> Result<(), EmailError> {
        let day = report.muster_day.format("%m/%d/%Y").to_string();
        let r = report;
        let body = format_template(
            &load_template("FinalMusterReport.html")?,
            &[
                &now(),
                &day,
                &r.total.0,
                &r.total.1,
                &r.officers.0,
                &r.officers.1,
                &r.enlisted.0,
                &r.enlisted.1,
                &r.civilians.0,
                &r.civilians.1,
                &r.reservists.0,
                &r.reservists.1,
                &r.contractors.0,
                &r.contractors.1,
                &r.pep.0,
                &r.pep.1,
                &r.temporary_duty,
                &r.present,
                &r.authorized_absence,
                &r.tad,
                &r.leave,
                &r.terminal_leave,
                &r.deployed,
                &r.siq,
                &r.ua,
                &r.other,
                &r.unaccounted,
                &r.unaccounted_names,
            ],
        )?;
        let subject = format!("Final Muster Report - {}", day);
        self.deliver(self.standard_message(to.to_vec(), &subject, body))
            .await
    }

    pub async fn send_account_updated(
        &self,
        to: &str,
        editor_id: &str,
        changes: &[Change],
    ) -> Result<(), EmailError> {
        let body = format_template(
            &load_template("AccountUpdated.html")?,
            &[&editor_id, &now(), &changes_body(changes)],
        )?;
        self.deliver(self.standard_message(
            vec![to.to_string()],
            "Your Account Has Been Updated!",
            body,
        ))
        .await
    }

    pub async fn send_change_event_occurred(
        &self,
        to: &str,
        editor_id: &str,
        object_id: &str,
        event_name: &str,
        model_name: &str,
        changes: &[Change],
    ) -> Result<(), EmailError> {
        let body = format_template(
            &load_template("ChangeEventOccurred.html")?,
            &[
                &editor_id,
                &event_name,
                &model_name,
                &object_id,
                &now(),
                &changes_body(changes),
            ],
        )?;
        let subject = format!("{} - {}", event_name, model_name);
        self.deliver(self.standard_message(vec![to.to_string()], &subject, body))
            .await
    }

    pub async fn send_billets_updated(
        &self,
        to: &str,
        editor_id: &str,
        changes: &[Change],
    ) -> Result<(), EmailError> {
        let body = format_template(
            &load_template("BilletsUpdated.html")?,
            &[&editor_id, &now(), &changes_body(changes)],
        )?;
        self.deliver(self.standard_message(
            vec![to.to_string()],
            "Billets have been updated!",
            body,
        ))
        .await
    }

    // Développeurs et destinataire, sans copie ni Reply-To.
    pub async fn send_begin_registration_error(
        &self,
        to: &str,
        person_id: &str,
    ) -> Result<(), EmailError> {
        let body = format_template(
            &load_template("BeginRegistrationError.html")?,
            &[&now(), &person_id],
        )?;
        let mut recipients = self.settings.developer_addresses.clone();
        recipients.push(to.to_string());
        self.deliver(self.direct_message(
            recipients,
            "IMPORTANT! Registration - Important Security Error",
            body,
        ))
        .await
    }

    pub async fn send_generic_error(
        &self,
        error_message: &str,
        subject: &str,
    ) -> Result<(), EmailError> {
        let body = format_template(
            &load_template("GenericError.html")?,
            &[&now(), &error_message],
        )?;
        self.deliver(self.direct_message(
            self.settings.developer_addresses.clone(),
            subject,
            body,
        ))
        .await
    }

    pub async fn send_initiate_password_reset(
        &self,
        to: &str,
        password_reset_id: &str,
    ) -> Result<(), EmailError> {
        let link = format!(
            "{}{}",
            self.settings.password_reset_page_url, password_reset_id
        );
        let body = format_template(
            &load_template("InitiatePasswordReset.html")?,
            &[&now(), &link, &to],
        )?;
        self.deliver(self.standard_message(vec![to.to_string()], "Password Reset", body))
            .await
    }

    // Message standard : expéditeur en From et en copie, Reply-To positionné.
    fn standard_message(&self, to: Vec<String>, subject: &str, html_body: String) -> Email {
        let sender = self.settings.sender();
        Email {
            from: sender.clone(),
            to,
            cc: vec![sender],
            reply_to: Some(self.settings.reply_to.clone()),
            subject: subject.to_string(),
            html_body,
        }
    }

    fn direct_message(&self, to: Vec<String>, subject: &str, html_body: String) -> Email {
        Email {
            from: self.settings.sender(),
            to,
            cc: Vec::new(),
            reply_to: None,
            subject: subject.to_string(),
            html_body,
        }
    }

    async fn deliver(&self, email: Email) -> Result<(), EmailError> {
        match self.mailer.send(&email).await {
            Ok(()) => {
                info!("Sent '{}' to {}", email.subject, email.to.join(", "));
                Ok(())
            }
            Err(e) => {
                error!("Failed to send '{}': {}", email.subject, e);
                Err(e)
            }
        }
    }
}

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn ssn_excerpt(ssn: &str) -> String {
    let chars: Vec<char> = ssn.chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

fn changes_body(changes: &[Change]) -> String {
    changes
        .iter()
        .map(|change| format!("{}\n<br />", change))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variance;
    use chrono::TimeZone;
    use serde_json::json;

    fn settings() -> EmailSettings {
        EmailSettings {
            sender_address: "webmaster@mail.mil".to_string(),
            sender_name: "Command Communications".to_string(),
            reply_to: "webmaster@mail.mil".to_string(),
            developer_addresses: vec![
                "dev.one@mail.mil".to_string(),
                "dev.two@example.com".to_string(),
            ],
            registration_page_url: "https://cc.example.com/finishregistration/".to_string(),
            password_reset_page_url: "https://cc.example.com/reset?id=".to_string(),
        }
    }

    fn helper() -> (EmailHelper, Arc<RecordingMailer>) {
        let mailer = Arc::new(RecordingMailer::new());
        (EmailHelper::new(mailer.clone(), settings()), mailer)
    }

    #[test]
    fn test_format_template_positional_and_escapes() {
        let out = format_template("{{x}} {0} and {1}, again {0}", &[&"a", &2]).unwrap();
        assert_eq!(out, "{x} a and 2, again a");
    }

    #[test]
    fn test_format_template_missing_argument_is_error() {
        let err = format_template("{0} {3}", &[&"a"]).unwrap_err();
        assert!(matches!(err, EmailError::Template(_)));
        assert!(matches!(
            format_template("oops }", &[]),
            Err(EmailError::Template(_))
        ));
        assert!(matches!(
            format_template("{name}", &[]),
            Err(EmailError::Template(_))
        ));
    }

    #[test]
    fn test_every_template_is_embedded() {
        for name in [
            "FailedAccountLogin.html",
            "ConfirmAccount.html",
            "FinalMusterReport.html",
            "AccountUpdated.html",
            "ChangeEventOccurred.html",
            "BilletsUpdated.html",
            "BeginRegistrationError.html",
            "GenericError.html",
            "InitiatePasswordReset.html",
        ] {
            assert!(load_template(name).is_ok(), "missing {}", name);
        }
        assert!(matches!(
            load_template("Nope.html"),
            Err(EmailError::Template(_))
        ));
    }

    #[test]
    fn test_ssn_excerpt_is_last_four() {
        assert_eq!(ssn_excerpt("123456789"), "6789");
        assert_eq!(ssn_excerpt("89"), "89");
    }

    #[tokio::test]
    async fn test_confirm_account_uses_standard_message() {
        let (helper, mailer) = helper();
        helper
            .send_confirm_account("sailor@mail.mil", "abc-123", "123456789")
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        let email = &sent[0];
        assert_eq!(email.to, vec!["sailor@mail.mil"]);
        assert_eq!(email.cc.len(), 1);
        assert_eq!(email.reply_to.as_deref(), Some("webmaster@mail.mil"));
        assert!(email
            .html_body
            .contains("https://cc.example.com/finishregistration/abc-123"));
        assert!(email.html_body.contains("6789"));
        assert!(!email.html_body.contains("12345"));
    }

    #[tokio::test]
    async fn test_final_muster_report_uses_muster_template() {
        let (helper, mailer) = helper();
        let report = MusterReport {
            muster_day: NaiveDate::from_ymd_opt(2016, 2, 29).unwrap(),
            total: (120, 118),
            unaccounted: 2,
            unaccounted_names: "Doe, Roe".to_string(),
            ..Default::default()
        };
        helper
            .send_final_muster_report(&["chief@mail.mil".to_string()], &report)
            .await
            .unwrap();

        let email = &mailer.sent()[0];
        assert_eq!(email.subject, "Final Muster Report - 02/29/2016");
        assert!(email.html_body.contains("Final Muster Report for 02/29/2016"));
        assert!(email.html_body.contains("118 / 120"));
        assert!(email.html_body.contains("Doe, Roe"));
        assert!(email.html_body.contains("td { padding"));
    }

    #[tokio::test]
    async fn test_account_updated_lists_changes() {
        let (helper, mailer) = helper();
        let change = Change {
            id: "c1".to_string(),
            editor_id: "editor".to_string(),
            object_name: "Person".to_string(),
            object_id: "p1".to_string(),
            variance: Variance {
                property_name: "LastName".to_string(),
                old_value: Some(json!("Smith")),
                new_value: Some(json!("Jones")),
            },
            time: Utc.with_ymd_and_hms(2016, 3, 1, 0, 0, 0).unwrap(),
            remarks: None,
        };
        helper
            .send_account_updated("sailor@mail.mil", "editor", &[change])
            .await
            .unwrap();

        let email = &mailer.sent()[0];
        assert!(email.html_body.contains("LastName: Smith -> Jones"));
    }

    #[tokio::test]
    async fn test_error_mails_go_to_developers() {
        let (helper, mailer) = helper();
        helper
            .send_begin_registration_error("victim@mail.mil", "p1")
            .await
            .unwrap();
        helper
            .send_generic_error("database unreachable", "Service Error")
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent[0].to.len(), 3);
        assert!(sent[0].to.contains(&"victim@mail.mil".to_string()));
        assert!(sent[0].cc.is_empty());
        assert_eq!(sent[1].to.len(), 2);
        assert_eq!(sent[1].subject, "Service Error");
        assert!(sent[1].html_body.contains("database unreachable"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_address_error() {
        let (helper, mailer) = helper();
        let err = helper
            .send_initiate_password_reset("not an address", "r1")
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::Address(_)));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_remaining_senders() {
        let (helper, mailer) = helper();
        helper
            .send_failed_account_login("sailor@mail.mil", "p1")
            .await
            .unwrap();
        helper
            .send_change_event_occurred("sailor@mail.mil", "editor", "p1", "Person Modified", "Person", &[])
            .await
            .unwrap();
        helper
            .send_billets_updated("sailor@mail.mil", "editor", &[])
            .await
            .unwrap();
        helper
            .send_initiate_password_reset("sailor@mail.mil", "r1")
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[1].subject, "Person Modified - Person");
        assert!(sent[3].html_body.contains("https://cc.example.com/reset?id=r1"));
    }
}
