//! Claim jobs run through the worker against in-memory stores and a scripted
//! partner.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use cardlink_core::{Card, CardBrand, Deal, Discount, Partner, ResultCode, UserId};
use cardlink_jobs::{
    BackoffPolicy, ClaimJobDeps, InMemoryScheduler, JobId, JobRecord, JobRegistry, JobRunnerFactory, JobState,
    JobType, JobWorker, OrchestratedJobRunner, RecordingDelay, RunnerConfig, Scheduler, SimpleJobRunner,
    WorkerConfig,
};
use cardlink_operations::{
    CardStore, ClaimStore, DealStore, InMemoryCardStore, InMemoryClaimStore, InMemoryDealStore,
    PartnerInvocationCoordinator, StoreConcluder,
};
use cardlink_partners::{CardRequest, ClaimRequest, PartnerAdapter, PartnerAdapters, PartnerError, PartnerReply};

/// Visa stand-in: claims answer with the scripted code.
struct VisaClaims {
    code: ResultCode,
    claims: AtomicUsize,
}

#[async_trait]
impl PartnerAdapter for VisaClaims {
    fn partner(&self) -> Partner {
        Partner::Visa
    }
    async fn add_card(&self, _: &CardRequest) -> Result<PartnerReply, PartnerError> {
        Ok(PartnerReply::new(ResultCode::Created))
    }
    async fn remove_card(&self, _: &CardRequest) -> Result<PartnerReply, PartnerError> {
        Ok(PartnerReply::new(ResultCode::Success))
    }
    async fn claim_deal(&self, request: &ClaimRequest) -> Result<PartnerReply, PartnerError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Ok(PartnerReply::new(self.code).with_reference(format!("visa-claim-{}", request.partner_deal_id)))
    }
}

struct World {
    scheduler: Arc<InMemoryScheduler>,
    cards: Arc<InMemoryCardStore>,
    deals: Arc<InMemoryDealStore>,
    claims: Arc<InMemoryClaimStore>,
    visa: Arc<VisaClaims>,
    runners: JobRunnerFactory,
}

fn world(code: ResultCode, batch_size: usize) -> World {
    world_on(
        InMemoryScheduler::new().with_backoff_policy(BackoffPolicy::fixed(Duration::ZERO)),
        code,
        batch_size,
    )
}

fn world_on(scheduler: InMemoryScheduler, code: ResultCode, batch_size: usize) -> World {
    let scheduler = Arc::new(scheduler);
    let cards = InMemoryCardStore::arc();
    let deals = InMemoryDealStore::arc();
    let claims = InMemoryClaimStore::arc();
    let visa = Arc::new(VisaClaims {
        code,
        claims: AtomicUsize::new(0),
    });

    let coordinator = Arc::new(PartnerInvocationCoordinator::new(
        PartnerAdapters::new().with(visa.clone()),
        StoreConcluder::new(cards.clone(), deals.clone(), claims.clone()),
    ));
    let deps = ClaimJobDeps::new(coordinator, cards.clone(), deals.clone(), claims.clone()).with_batch_size(batch_size);
    let registry = Arc::new(JobRegistry::standard(deps));

    let runners = JobRunnerFactory::new(
        SimpleJobRunner::new(registry.clone(), scheduler.clone()),
        OrchestratedJobRunner::new(
            registry,
            scheduler.clone(),
            Arc::new(RecordingDelay::new()),
            RunnerConfig::default().with_max_retries(1),
        ),
    );

    World {
        scheduler,
        cards,
        deals,
        claims,
        visa,
        runners,
    }
}

async fn visa_card(world: &World) -> Card {
    let mut card = Card::new(UserId::new(), CardBrand::Visa, "4242", "tok_visa").unwrap();
    card.link_partner(Partner::Visa, "visa-card-1");
    world.cards.save(&card).await.unwrap();
    card
}

async fn visa_deal(world: &World, merchant: &str) -> Deal {
    let now = Utc::now();
    let mut deal = Deal::new(merchant, Discount::Percent(10), now - chrono::Duration::hours(1), now + chrono::Duration::days(3))
        .unwrap();
    deal.register_partner(Partner::Visa, format!("offer-{merchant}"));
    world.deals.save(&deal).await.unwrap();
    deal
}

async fn run_until_settled(world: &World, job_id: JobId) -> anyhow::Result<JobRecord> {
    let worker = JobWorker::new(
        world.scheduler.clone(),
        world.runners.clone(),
        WorkerConfig::default().with_poll_interval(Duration::from_millis(5)),
    )
    .spawn();

    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(record) = world.scheduler.get(job_id).await? {
                if record.state.is_terminal() {
                    return Ok::<_, anyhow::Error>(record);
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await??;

    let stats = worker.shutdown().await;
    assert_eq!(stats.jobs_panicked, 0);
    Ok(settled)
}

#[tokio::test]
async fn new_card_claims_every_deal_across_batches() -> anyhow::Result<()> {
    cardlink_observability::init_for_tests();
    let world = world(ResultCode::Success, 1);
    let card = visa_card(&world).await;
    let first = visa_deal(&world, "cafe").await;
    let second = visa_deal(&world, "diner").await;

    let record = JobRecord::orchestrated(JobType::ClaimDealsForNewCard, "claim deals for new card")
        .with_payload("card_id", card.id);
    let job_id = world.scheduler.enqueue_job(record, Duration::ZERO).await?;

    let settled = run_until_settled(&world, job_id).await?;

    assert_eq!(settled.state, JobState::Completed);
    // One deal per batch: the first lease requeues, the second finishes.
    assert_eq!(settled.attempt, 2);
    assert_eq!(world.visa.claims.load(Ordering::SeqCst), 2);
    for deal in [first, second] {
        let claim = world.claims.get(card.id, deal.id).await?.expect("claim recorded");
        assert_eq!(claim.outcome, ResultCode::Success);
        assert!(claim.partner_references.contains_key(&Partner::Visa));
    }
    Ok(())
}

#[tokio::test]
async fn batches_continue_without_backoff_under_default_policy() -> anyhow::Result<()> {
    cardlink_observability::init_for_tests();
    // Default policy: a failure would hide the record for 30s or more.
    let world = world_on(InMemoryScheduler::new(), ResultCode::Success, 1);
    let card = visa_card(&world).await;
    for merchant in ["cafe", "diner", "bakery", "bistro"] {
        visa_deal(&world, merchant).await;
    }

    let record = JobRecord::orchestrated(JobType::ClaimDealsForNewCard, "claim deals for new card")
        .with_payload("card_id", card.id);
    let job_id = world.scheduler.enqueue_job(record, Duration::ZERO).await?;

    let settled = run_until_settled(&world, job_id).await?;

    assert_eq!(settled.state, JobState::Completed);
    assert_eq!(settled.attempt, 4);
    assert_eq!(settled.backoff_count, 0);
    assert_eq!(world.visa.claims.load(Ordering::SeqCst), 4);
    assert_eq!(world.claims.all().len(), 4);
    Ok(())
}

#[tokio::test]
async fn new_deal_is_claimed_for_linked_cards_only() -> anyhow::Result<()> {
    let world = world(ResultCode::Success, 10);
    let linked = visa_card(&world).await;
    let unlinked = Card::new(UserId::new(), CardBrand::Visa, "1111", "tok_other").unwrap();
    world.cards.save(&unlinked).await?;
    let deal = visa_deal(&world, "bakery").await;

    let record = JobRecord::orchestrated(JobType::ClaimDealForExistingCards, "claim new deal")
        .with_payload("deal_id", deal.id);
    let job_id = world.scheduler.enqueue_job(record, Duration::ZERO).await?;

    let settled = run_until_settled(&world, job_id).await?;

    assert_eq!(settled.state, JobState::Completed);
    assert!(world.claims.get(linked.id, deal.id).await?.is_some());
    assert!(world.claims.get(unlinked.id, deal.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn settled_claims_are_not_repeated() -> anyhow::Result<()> {
    let world = world(ResultCode::DealAlreadyClaimed, 10);
    let card = visa_card(&world).await;
    visa_deal(&world, "cafe").await;

    for _ in 0..2 {
        let record = JobRecord::orchestrated(JobType::ClaimDealsForNewCard, "claim").with_payload("card_id", card.id);
        let job_id = world.scheduler.enqueue_job(record, Duration::ZERO).await?;
        assert_eq!(run_until_settled(&world, job_id).await?.state, JobState::Completed);
    }

    assert_eq!(world.visa.claims.load(Ordering::SeqCst), 1);
    // DealAlreadyClaimed is reduced to Success by the claim table.
    assert_eq!(world.claims.all()[0].outcome, ResultCode::Success);
    Ok(())
}

#[tokio::test]
async fn missing_card_cancels_job_after_cleanup() -> anyhow::Result<()> {
    let world = world(ResultCode::Success, 10);
    let record = JobRecord::orchestrated(JobType::ClaimDealsForNewCard, "claim for deleted card")
        .with_payload("card_id", cardlink_core::CardId::new());
    let job_id = world.scheduler.enqueue_job(record, Duration::ZERO).await?;

    let settled = run_until_settled(&world, job_id).await?;

    assert_eq!(settled.state, JobState::Canceled);
    assert!(settled.payload.is_empty());
    assert_eq!(settled.attempt, 1);
    Ok(())
}

#[tokio::test]
async fn transient_claim_failures_requeue_the_job() -> anyhow::Result<()> {
    let world = world(ResultCode::Timeout, 10);
    let card = visa_card(&world).await;
    let deal = visa_deal(&world, "cafe").await;

    let record = JobRecord::orchestrated(JobType::ClaimDealsForNewCard, "claim").with_payload("card_id", card.id);
    let mut leased = {
        world.scheduler.enqueue_job(record, Duration::ZERO).await?;
        world.scheduler.dequeue_leased_job().await?.expect("leased")
    };

    world.runners.select_runner(&leased).run(&mut leased).await?;

    // 1 batch + 1 retry, then the scheduler backoff.
    assert_eq!(world.visa.claims.load(Ordering::SeqCst), 2);
    assert_eq!(leased.state, JobState::Pending);
    assert_eq!(leased.backoff_count, 1);
    assert!(world.claims.get(card.id, deal.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn malformed_payload_is_terminal() -> anyhow::Result<()> {
    let world = world(ResultCode::Success, 10);
    let record = JobRecord::orchestrated(JobType::ClaimDealForExistingCards, "bad payload").with_payload("deal_id", "not-a-uuid");
    let job_id = world.scheduler.enqueue_job(record, Duration::ZERO).await?;

    let settled = run_until_settled(&world, job_id).await?;
    assert_eq!(settled.state, JobState::Canceled);
    Ok(())
}

#[tokio::test]
async fn recurring_ping_is_rearmed_then_completed() -> anyhow::Result<()> {
    let world = world(ResultCode::Success, 10);
    let record = JobRecord::simple(JobType::Ping, "heartbeat")
        .with_recurrence(cardlink_jobs::Recurrence::times(Duration::ZERO, 2));
    let job_id = world.scheduler.enqueue_job(record, Duration::ZERO).await?;

    let settled = run_until_settled(&world, job_id).await?;

    assert_eq!(settled.state, JobState::Completed);
    assert_eq!(settled.attempt, 3);
    Ok(())
}
