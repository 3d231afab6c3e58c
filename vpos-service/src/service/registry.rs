//! Card registry service.
//!
//! Owns the card lifecycle: hosted registration (shell card, provider
//! process handle, confirmation against the provider listing), the
//! single-default invariant, and provider-confirmed deletion.

use std::sync::Arc;

use vpos_types::{
    AppError, CardEnrollment, CardId, CardView, DomainError, PaymentGateway, PaymentStore,
    RegistrationStart, UserId,
};

/// Fallbacks for contact fields the provider requires on registration.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentDefaults {
    pub cellphone: String,
    pub email: String,
}

/// Parameters for starting a hosted card registration.
#[derive(Debug, Clone)]
pub struct EnrollmentRequest {
    pub user_id: UserId,
    pub cellphone: Option<String>,
    pub email: Option<String>,
    /// Where the provider sends the user after the hosted form.
    pub return_url: String,
}

/// Card registry service, generic over the store and gateway ports.
pub struct CardRegistry<S: PaymentStore, G: PaymentGateway> {
    store: Arc<S>,
    gateway: Arc<G>,
    defaults: EnrollmentDefaults,
}

impl<S: PaymentStore, G: PaymentGateway> CardRegistry<S, G> {
    pub fn new(store: Arc<S>, gateway: Arc<G>, defaults: EnrollmentDefaults) -> Self {
        Self {
            store,
            gateway,
            defaults,
        }
    }

    /// Starts a hosted card registration.
    ///
    /// Records an inactive shell card (default if the user has no active
    /// default yet) and asks the provider for the process handle that drives
    /// its hosted registration form.
    #[tracing::instrument(skip(self, req), fields(user_id = %req.user_id))]
    pub async fn begin_registration(
        &self,
        req: EnrollmentRequest,
    ) -> Result<RegistrationStart, AppError> {
        if !self.store.user_exists(req.user_id).await? {
            return Err(DomainError::UserNotFound(req.user_id).into());
        }
        let is_default = self.store.default_card(req.user_id).await?.is_none();
        let card = self.store.create_card(req.user_id, is_default).await?;

        let enrollment = CardEnrollment {
            user_id: req.user_id,
            card_id: card.id,
            cellphone: req
                .cellphone
                .unwrap_or_else(|| self.defaults.cellphone.clone()),
            email: req.email.unwrap_or_else(|| self.defaults.email.clone()),
            return_url: req.return_url,
        };
        let process = self.gateway.init_card_registration(&enrollment).await?;
        tracing::info!(card_id = %card.id, process_id = %process, "card registration started");
        Ok(RegistrationStart {
            card_id: card.id,
            process_id: process.0,
        })
    }

    /// Confirms the user's most recent registration.
    ///
    /// The pending shell is matched against the provider's card listing and
    /// activated with the detail the provider reports. A missing shell or a
    /// listing that does not contain it is `RegistrationNotFound`; a provider
    /// that cannot be reached stays `GatewayUnavailable` so the caller can
    /// retry instead of giving up on the registration.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_registration(&self, user: UserId) -> Result<CardView, AppError> {
        let shell = self
            .store
            .latest_inactive_card(user)
            .await?
            .ok_or(DomainError::RegistrationNotFound(user))?;
        let listed = self
            .gateway
            .user_card(user, shell.id)
            .await?
            .ok_or(DomainError::RegistrationNotFound(user))?;
        let card = self.store.activate_card(shell.id, listed.into()).await?;
        tracing::info!(card_id = %card.id, "card registration confirmed");
        Ok(CardView::from(&card))
    }

    /// Makes the given active card the user's only default.
    #[tracing::instrument(skip(self))]
    pub async fn set_default(&self, user: UserId, card: CardId) -> Result<(), AppError> {
        if self.store.set_default_card(user, card).await? {
            Ok(())
        } else {
            Err(DomainError::CardNotFound(card).into())
        }
    }

    /// Deletes a card, provider first.
    ///
    /// The local record goes away only after the provider confirms deletion
    /// of the alias token. Shells that never completed registration carry no
    /// alias and are removed locally.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, user: UserId, card: CardId) -> Result<bool, AppError> {
        let Some(stored) = self.store.get_card(user, card).await? else {
            return Ok(false);
        };
        if let Some(alias) = &stored.alias_token {
            self.gateway.delete_card(user, alias).await?;
        }
        Ok(self.store.delete_card(user, card).await?)
    }

    /// Lists the user's active cards.
    pub async fn cards(&self, user: UserId) -> Result<Vec<CardView>, AppError> {
        let cards = self.store.list_active_cards(user).await?;
        Ok(cards.iter().map(CardView::from).collect())
    }

    /// Fetches one of the user's cards.
    pub async fn card(&self, user: UserId, card: CardId) -> Result<Option<CardView>, AppError> {
        Ok(self
            .store
            .get_card(user, card)
            .await?
            .as_ref()
            .map(CardView::from))
    }

    /// The user's default card, if any.
    pub async fn default_card(&self, user: UserId) -> Result<Option<CardView>, AppError> {
        Ok(self
            .store
            .default_card(user)
            .await?
            .as_ref()
            .map(CardView::from))
    }
}
