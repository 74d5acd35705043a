//! Scripted playbook for an OWASP Juice Shop storefront: register, log in,
//! put an item in the basket, check out, and review the order history.

use rand::Rng;
use serde_json::json;

use crate::browser::Session;
use crate::error::Result;
use crate::strategies::{AgentContext, Strategy};
use crate::trace::metadata;

const OPEN_MENU: &str = "button[aria-label='Open Sidenav']";
const BASKET: &str = "button[aria-label='Show the shopping cart']";
const ORDERS_MENU: &str = "button[aria-label='Show Orders and Payment Menu']";

const LOGIN_EMAIL: &str = "#email";
const LOGIN_PASSWORD: &str = "#password";
const LOGIN_BUTTON: &str = "#loginButton";

const REGISTER_EMAIL: &str = "#emailControl";
const REGISTER_PASSWORD: &str = "#passwordControl";
const REGISTER_REPEAT: &str = "#repeatPasswordControl";
const SECURITY_QUESTION: &str = "mat-select[name='securityQuestion']";
const SECURITY_ANSWER: &str = "#securityAnswerControl";
const REGISTER_BUTTON: &str = "#registerButton";

const CHECKOUT_BUTTON: &str = "#checkoutButton";
const ADDRESS_SUBMIT: &str = "#submitButton";
const FIRST_RADIO: &str = "mat-radio-button";

const ADD_ADDRESS_LABEL: &str = "Add New Address";

/// Transient overlays the storefront shows on first load. Dismissal is
/// best-effort: an absent label moves on to the next candidate.
const BANNER_LABELS: [&str; 3] = ["Dismiss", "Me want it!", "Accept"];

/// Milestones of the storefront walk, in execution order. `AddressEntered`
/// is reached only when the checkout page offers the add-address control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    BannersDismissed,
    MenuOpened,
    Registered,
    LoggedIn,
    ItemInCart,
    AddressEntered,
    PaymentSelected,
    OrderPlaced,
    OrdersViewed,
    End,
}

impl Phase {
    /// Successor in the playbook. `address_control_visible` only matters
    /// when leaving `ItemInCart`.
    pub fn next(self, address_control_visible: bool) -> Phase {
        match self {
            Phase::Start => Phase::BannersDismissed,
            Phase::BannersDismissed => Phase::MenuOpened,
            Phase::MenuOpened => Phase::Registered,
            Phase::Registered => Phase::LoggedIn,
            Phase::LoggedIn => Phase::ItemInCart,
            Phase::ItemInCart => {
                if address_control_visible {
                    Phase::AddressEntered
                } else {
                    Phase::PaymentSelected
                }
            }
            Phase::AddressEntered => Phase::PaymentSelected,
            Phase::PaymentSelected => Phase::OrderPlaced,
            Phase::OrderPlaced => Phase::OrdersViewed,
            Phase::OrdersViewed => Phase::End,
            Phase::End => Phase::End,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShopperProfile {
    pub email: String,
    pub password: String,
    pub security_answer: String,
}

impl ShopperProfile {
    /// Fresh throwaway identity for one run.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        ShopperProfile {
            email: format!("agent_{}@example.com", rng.random_range(1000..10_000)),
            password: "P@ssw0rd!".to_string(),
            security_answer: "Automata".to_string(),
        }
    }
}

pub struct JuiceShopStrategy {
    context: AgentContext,
    profile: ShopperProfile,
}

impl JuiceShopStrategy {
    pub fn new(context: AgentContext, profile: ShopperProfile) -> Self {
        JuiceShopStrategy { context, profile }
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    fn remember(&mut self, note: &str) {
        self.context
            .memory
            .save_context(json!({ "input": note }), json!({ "output": note }));
    }

    async fn step(&mut self, session: &Session, phase: Phase) -> Result<Phase> {
        match phase {
            Phase::Start => {
                session.goto(self.context.base_url.as_str()).await?;
                self.dismiss_banners(session).await?;
                Ok(phase.next(false))
            }
            Phase::BannersDismissed => {
                session.click_selector(OPEN_MENU).await?;
                session.click_text("Login").await?;
                self.dismiss_banners(session).await?;
                Ok(phase.next(false))
            }
            Phase::MenuOpened => {
                self.register(session).await?;
                Ok(phase.next(false))
            }
            Phase::Registered => {
                self.login(session).await?;
                session.snapshot_dom("post_login").await?;
                Ok(phase.next(false))
            }
            Phase::LoggedIn => {
                session.click_text("Add to Basket").await?;
                let url = session.current_url().await;
                self.context
                    .logger
                    .record("add_to_cart", &url, Default::default())
                    .await;
                Ok(phase.next(false))
            }
            Phase::ItemInCart => {
                session.click_selector(BASKET).await?;
                session.click_selector(CHECKOUT_BUTTON).await?;
                let address_needed =
                    session.is_visible_text(ADD_ADDRESS_LABEL).await?;
                if address_needed {
                    self.add_address(session).await?;
                } else {
                    self.select_payment(session).await?;
                }
                Ok(phase.next(address_needed))
            }
            Phase::AddressEntered => {
                self.select_payment(session).await?;
                Ok(phase.next(false))
            }
            Phase::PaymentSelected => {
                session.click_text("Place your order and pay").await?;
                let url = session.current_url().await;
                self.context
                    .logger
                    .record("checkout", &url, Default::default())
                    .await;
                Ok(phase.next(false))
            }
            Phase::OrderPlaced => {
                session.click_selector(ORDERS_MENU).await?;
                session.click_text("Order History").await?;
                let url = session.current_url().await;
                self.context
                    .logger
                    .record("orders", &url, Default::default())
                    .await;
                session.snapshot_dom("orders").await?;
                Ok(phase.next(false))
            }
            Phase::OrdersViewed => Ok(phase.next(false)),
            Phase::End => Ok(Phase::End),
        }
    }

    /// Try each candidate label once; absent or detached banners are skipped,
    /// anything else aborts the run. The only place errors are suppressed.
    async fn dismiss_banners(&mut self, session: &Session) -> Result<()> {
        for label in BANNER_LABELS {
            let visible = match session.is_visible_text(label).await {
                Ok(visible) => visible,
                Err(error) if error.is_absence() => false,
                Err(error) => return Err(error),
            };
            if !visible {
                continue;
            }
            match session.dismiss_text(label).await {
                Ok(()) => {}
                Err(error) if error.is_absence() => continue,
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    async fn register(&mut self, session: &Session) -> Result<()> {
        session.click_text("Not yet a customer?").await?;
        session.fill_form(REGISTER_EMAIL, &self.profile.email).await?;
        session
            .fill_form(REGISTER_PASSWORD, &self.profile.password)
            .await?;
        session
            .fill_form(REGISTER_REPEAT, &self.profile.password)
            .await?;
        session.click_selector(SECURITY_QUESTION).await?;
        session
            .click_text("Your eldest siblings middle name")
            .await?;
        session
            .fill_form(SECURITY_ANSWER, &self.profile.security_answer)
            .await?;
        session.click_selector(REGISTER_BUTTON).await?;
        let url = session.current_url().await;
        self.context
            .logger
            .record("register", &url, metadata([("email", self.profile.email.as_str())]))
            .await;
        Ok(())
    }

    async fn login(&mut self, session: &Session) -> Result<()> {
        session.click_selector(OPEN_MENU).await?;
        session.click_text("Login").await?;
        session.fill_form(LOGIN_EMAIL, &self.profile.email).await?;
        session
            .fill_form(LOGIN_PASSWORD, &self.profile.password)
            .await?;
        session.click_selector(LOGIN_BUTTON).await?;
        let url = session.current_url().await;
        self.context
            .logger
            .record("login", &url, metadata([("email", self.profile.email.as_str())]))
            .await;
        Ok(())
    }

    async fn add_address(&mut self, session: &Session) -> Result<()> {
        session.click_text(ADD_ADDRESS_LABEL).await?;
        let fields = [
            ("input[placeholder='Please provide a country.']", "USA"),
            ("input[placeholder='Please provide a name.']", "Agent User"),
            ("input[placeholder='Please provide a mobile number.']", "5551234567"),
            ("input[placeholder='Please provide a ZIP code.']", "12345"),
            ("input[placeholder='Please provide an address.']", "123 Test Lane"),
            ("input[placeholder='Please provide a city.']", "Testville"),
            ("input[placeholder='Please provide a state.']", "CA"),
        ];
        for (selector, value) in fields {
            session.fill_form(selector, value).await?;
        }
        session.click_selector(ADDRESS_SUBMIT).await?;
        let url = session.current_url().await;
        self.context
            .logger
            .record("add_address", &url, Default::default())
            .await;
        Ok(())
    }

    /// Pick the saved address, the default delivery speed, and the wallet,
    /// advancing through the three checkout screens.
    async fn select_payment(&mut self, session: &Session) -> Result<()> {
        session.click_selector(FIRST_RADIO).await?;
        session.click_text("Continue").await?;
        session.click_selector(FIRST_RADIO).await?;
        session.click_text("Continue").await?;
        session.click_text("Pay with wallet").await?;
        session.click_text("Continue").await?;
        Ok(())
    }
}

impl Strategy for JuiceShopStrategy {
    async fn run(&mut self, session: &mut Session) -> Result<()> {
        let mut phase = Phase::Start;
        while phase != Phase::End {
            phase = self.step(session, phase).await?;
            self.remember(&format!("reached {phase:?}"));
        }
        Ok(())
    }
}
