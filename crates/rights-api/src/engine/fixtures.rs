//! Shared test world: an approved asset, open terms, an approved license
//! and an account for every role.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rights_chain::DigestLedger;
use rights_core::{ApplicationId, AssetId, ProductId, UserId};
use rights_settlement::{RetryPolicy, SimulatedGateway};
use rights_state::{
    LicenseType, NewAsset, ProductDraft, ProductStatus, Role, TermsDraft, VerificationStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::AppConfig;
use crate::engine::{products, registry, workflow};
use crate::guard::InMemoryDirectory;
use crate::notify::RecordingNotifier;
use crate::state::{AppState, Collaborators};

pub struct Fixture {
    pub state: AppState,
    pub dir: Arc<InMemoryDirectory>,
    pub gateway: Arc<SimulatedGateway>,
    pub ledger: Arc<DigestLedger>,
    pub notifier: Arc<RecordingNotifier>,
    pub owner: UserId,
    pub admin: UserId,
    pub licensee: UserId,
    pub buyer: UserId,
    pub asset_id: AssetId,
    pub license_id: ApplicationId,
}

pub fn fixture() -> Fixture {
    fixture_with(|_| {})
}

/// Like [`fixture`], with a chance to adjust the configuration first.
pub fn fixture_with(configure: impl FnOnce(&mut AppConfig)) -> Fixture {
    let dir = Arc::new(InMemoryDirectory::new());
    let gateway = Arc::new(SimulatedGateway::default());
    let ledger = Arc::new(DigestLedger::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let mut config = AppConfig::default();
    config.platform.payment_retry = RetryPolicy {
        timeout: Duration::from_millis(200),
        max_attempts: 2,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    };
    configure(&mut config);
    let state = AppState::with_config(
        config,
        Collaborators {
            identity: dir.clone(),
            ledger: ledger.clone(),
            gateway: gateway.clone(),
            notifier: notifier.clone(),
        },
        None,
    );

    let owner = dir.add(Role::Creator, "owner");
    let admin = dir.add(Role::Admin, "admin");
    let licensee = dir.add(Role::SecondaryCreator, "licensee");
    let buyer = dir.add(Role::Buyer, "buyer");

    let asset = registry::register_asset(
        &state,
        owner,
        NewAsset {
            title: "Harbour at dusk".into(),
            ..NewAsset::default()
        },
    )
    .unwrap();
    registry::moderate_asset(&state, asset.id, admin, VerificationStatus::Approved).unwrap();
    let terms = registry::publish_terms(
        &state,
        asset.id,
        owner,
        TermsDraft {
            license_type: LicenseType::Standard,
            revenue_share_percent: dec!(20),
            base_fee: dec!(0),
            territory: None,
            duration: None,
            requirements: None,
            restrictions: None,
            auto_approve: true,
            max_licenses: 0,
        },
    )
    .unwrap();
    let license = workflow::apply(
        &state,
        licensee,
        workflow::ApplyRequest {
            asset_id: asset.id,
            terms_id: terms.id,
            message: None,
            extra: BTreeMap::new(),
        },
    )
    .unwrap();

    Fixture {
        state,
        dir,
        gateway,
        ledger,
        notifier,
        owner,
        admin,
        licensee,
        buyer,
        asset_id: asset.id,
        license_id: license.id,
    }
}

impl Fixture {
    /// An active product under the fixture license.
    pub fn product(&self, price: Decimal, inventory: u32) -> ProductId {
        let product = products::create_product(
            &self.state,
            self.licensee,
            self.license_id,
            ProductDraft {
                title: "Print".into(),
                description: String::new(),
                category: "prints".into(),
                price,
                inventory_count: inventory,
                images: vec![],
                tags: vec![],
                specifications: Default::default(),
            },
        )
        .unwrap();
        products::set_product_status(&self.state, product.id, self.licensee, ProductStatus::Active)
            .unwrap();
        product.id
    }
}
