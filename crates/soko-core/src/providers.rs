//! Payment provider strategies.
//!
//! The core never speaks a gateway protocol. Each provider is a strategy
//! behind [`PaymentProvider`]: given a fresh intent it answers with a
//! directive that both tells the caller what to show the payer and decides
//! the intent's first transition.

use serde::{Deserialize, Serialize};

use soko_types::{PaymentIntent, ProviderId, Result, SokoError};

/// What the payer must do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum ProviderDirective {
    /// The money is already collected (mock provider). Intent goes
    /// straight to PAID.
    Settled,
    /// Send the payer to a hosted checkout page. Intent goes to
    /// AWAITING_PAYMENT until the provider's webhook lands.
    RedirectTo { url: String },
    /// Show static bank transfer instructions. Intent goes to
    /// MANUAL_PENDING until an operator confirms the transfer.
    BankInstructions {
        bank_name: String,
        account_number: String,
        account_name: String,
        sla_hours: i64,
    },
}

/// One way of collecting money.
pub trait PaymentProvider {
    fn id(&self) -> ProviderId;

    /// Start collection for a freshly created intent.
    fn begin(&self, intent: &PaymentIntent) -> Result<ProviderDirective>;
}

/// Test double that settles instantly.
#[derive(Debug, Default)]
pub struct MockProvider;

impl PaymentProvider for MockProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Mock
    }

    fn begin(&self, _intent: &PaymentIntent) -> Result<ProviderDirective> {
        Ok(ProviderDirective::Settled)
    }
}

/// Hosted checkout redirect.
#[derive(Debug)]
pub struct HostedCheckoutProvider {
    base_url: String,
}

impl HostedCheckoutProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl PaymentProvider for HostedCheckoutProvider {
    fn id(&self) -> ProviderId {
        ProviderId::HostedCheckout
    }

    fn begin(&self, intent: &PaymentIntent) -> Result<ProviderDirective> {
        if self.base_url.is_empty() {
            return Err(SokoError::ProviderUnavailable {
                provider: self.id().to_string(),
            });
        }
        Ok(ProviderDirective::RedirectTo {
            url: format!(
                "{}/pay/{}?amount={}",
                self.base_url.trim_end_matches('/'),
                intent.reference,
                intent.amount.0
            ),
        })
    }
}

/// Manual bank transfer with static instructions and a confirmation SLA.
#[derive(Debug)]
pub struct BankTransferProvider {
    bank_name: String,
    account_number: String,
    account_name: String,
    sla_hours: i64,
}

impl BankTransferProvider {
    #[must_use]
    pub fn new(
        bank_name: impl Into<String>,
        account_number: impl Into<String>,
        account_name: impl Into<String>,
        sla_hours: i64,
    ) -> Self {
        Self {
            bank_name: bank_name.into(),
            account_number: account_number.into(),
            account_name: account_name.into(),
            sla_hours,
        }
    }
}

impl PaymentProvider for BankTransferProvider {
    fn id(&self) -> ProviderId {
        ProviderId::BankTransfer
    }

    fn begin(&self, _intent: &PaymentIntent) -> Result<ProviderDirective> {
        Ok(ProviderDirective::BankInstructions {
            bank_name: self.bank_name.clone(),
            account_number: self.account_number.clone(),
            account_name: self.account_name.clone(),
            sla_hours: self.sla_hours,
        })
    }
}

/// The providers the core ships with, keyed by id.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    /// Registry with the stock trio configured for the given checkout URL
    /// and settlement account details.
    #[must_use]
    pub fn standard(
        checkout_base_url: impl Into<String>,
        bank_name: impl Into<String>,
        account_number: impl Into<String>,
        account_name: impl Into<String>,
        bank_sla_hours: i64,
    ) -> Self {
        Self {
            providers: vec![
                Box::new(MockProvider),
                Box::new(HostedCheckoutProvider::new(checkout_base_url)),
                Box::new(BankTransferProvider::new(
                    bank_name,
                    account_number,
                    account_name,
                    bank_sla_hours,
                )),
            ],
        }
    }

    pub fn get(&self, id: ProviderId) -> Result<&dyn PaymentProvider> {
        self.providers
            .iter()
            .map(AsRef::as_ref)
            .find(|p| p.id() == id)
            .ok_or(SokoError::ProviderUnavailable {
                provider: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use soko_types::{IntentId, IntentPurpose, IntentStatus, Minor, UserId};

    fn intent(reference: &str, amount: u64) -> PaymentIntent {
        let now = Utc::now();
        PaymentIntent {
            id: IntentId::new(),
            owner: UserId::new(),
            provider: ProviderId::Mock,
            reference: reference.to_string(),
            purpose: IntentPurpose::Topup,
            amount: Minor(amount),
            status: IntentStatus::Initialized,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn mock_settles_immediately() {
        let directive = MockProvider.begin(&intent("SOKO-1", 100)).unwrap();
        assert_eq!(directive, ProviderDirective::Settled);
    }

    #[test]
    fn hosted_checkout_builds_url() {
        let provider = HostedCheckoutProvider::new("https://pay.soko.test/");
        let directive = provider.begin(&intent("SOKO-42", 105_000_000)).unwrap();
        match directive {
            ProviderDirective::RedirectTo { url } => {
                assert_eq!(url, "https://pay.soko.test/pay/SOKO-42?amount=105000000");
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn hosted_checkout_without_url_unavailable() {
        let provider = HostedCheckoutProvider::new("");
        let err = provider.begin(&intent("SOKO-1", 100)).unwrap_err();
        assert!(matches!(err, SokoError::ProviderUnavailable { .. }));
    }

    #[test]
    fn bank_transfer_instructions_carry_sla() {
        let provider = BankTransferProvider::new("Wema Bank", "0123456789", "Soko Escrow Ltd", 48);
        match provider.begin(&intent("SOKO-1", 100)).unwrap() {
            ProviderDirective::BankInstructions {
                bank_name,
                sla_hours,
                ..
            } => {
                assert_eq!(bank_name, "Wema Bank");
                assert_eq!(sla_hours, 48);
            }
            other => panic!("expected bank instructions, got {other:?}"),
        }
    }

    #[test]
    fn registry_resolves_all_stock_providers() {
        let registry =
            ProviderRegistry::standard("https://pay.soko.test", "Wema Bank", "0123456789", "Soko", 48);
        for id in [
            ProviderId::Mock,
            ProviderId::HostedCheckout,
            ProviderId::BankTransfer,
        ] {
            assert_eq!(registry.get(id).unwrap().id(), id);
        }
    }
}
