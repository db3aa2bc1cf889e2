//! Runs the generated SQL against a live database and checks it against the
//! in-memory store. Needs `TEST_DATABASE_URL` pointing at a disposable
//! database: the four tables are truncated before seeding.
//!
//! ```text
//! TEST_DATABASE_URL=postgres://localhost/ranker_test cargo test -- --ignored
//! ```

use chrono::NaiveDate;
use opportunity_ranker::buildings::{
    Borough, Building, BuildingFilter, BuildingId, BuildingStore, Elevator,
    MemoryBuildingStore, Opportunity, OpportunityFilter, OpportunityId, OpportunityStatus,
    PgBuildingStore, PriorityLevel, SortSpec, Violation, ViolationSeverity, ViolationStatus,
};
use opportunity_ranker::buildings::retrieval::{PageWindow, PredicateSet, SortKey, SortOrder};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

struct Fixture {
    buildings: Vec<Building>,
    elevators: Vec<Elevator>,
    violations: Vec<Violation>,
    opportunities: Vec<Opportunity>,
}

fn building(
    id: i64,
    borough: Borough,
    zip_code: &str,
    year_built: Option<i32>,
    floors: Option<i32>,
    last_inspection_date: Option<NaiveDate>,
) -> Building {
    Building {
        id: BuildingId(id),
        building_code: format!("20{id:05}"),
        address: format!("{id} Atlantic Ave"),
        borough,
        zip_code: Some(zip_code.to_string()),
        year_built,
        floors,
        units: Some(40),
        owner_name: Some(format!("Owner {id}")),
        owner_contact: None,
        property_manager: None,
        last_inspection_date,
    }
}

fn elevator(id: i64, building_id: i64, year_installed: i32, modernized: Option<i32>) -> Elevator {
    Elevator {
        id,
        building_id: BuildingId(building_id),
        elevator_code: format!("EL-{id:03}"),
        device_number: Some(format!("1P{id:04}")),
        elevator_type: Some("Passenger".to_string()),
        manufacturer: Some("Schindler".to_string()),
        year_installed: Some(year_installed),
        capacity: Some(3000),
        floors_served: Some(12),
        last_inspection_date: None,
        inspection_status: Some("Passed".to_string()),
        modernization_year: modernized,
    }
}

fn violation(
    id: i64,
    building_id: i64,
    violation_date: NaiveDate,
    violation_type: &str,
    status: ViolationStatus,
) -> Violation {
    Violation {
        id,
        building_id: BuildingId(building_id),
        violation_code: format!("VX-{id:04}"),
        violation_date: Some(violation_date),
        violation_type: Some(violation_type.to_string()),
        description: None,
        severity: ViolationSeverity::High,
        status,
        resolution_date: None,
        fine_amount: Some(250.0),
    }
}

fn opportunity(
    id: i64,
    building_id: i64,
    score: Option<u8>,
    status: OpportunityStatus,
) -> Opportunity {
    Opportunity {
        id: OpportunityId(id),
        building_id: BuildingId(building_id),
        opportunity_score: score,
        priority_level: score.map(PriorityLevel::for_score),
        estimated_value: score.map(|score| f64::from(score) * 5_000.0),
        roi_estimate: Some(14.5),
        payback_period_years: Some(7.25),
        energy_savings_potential: Some(30.0),
        status,
        notes: None,
    }
}

fn fixture() -> Fixture {
    Fixture {
        buildings: vec![
            building(1, Borough::Brooklyn, "11217", Some(1928), Some(14), Some(date(2024, 2, 1))),
            building(2, Borough::Brooklyn, "11201", Some(1965), Some(22), None),
            building(3, Borough::Manhattan, "10001", Some(1910), Some(40), Some(date(2023, 6, 9))),
            building(4, Borough::Queens, "11101", None, Some(7), Some(date(2024, 7, 30))),
            building(5, Borough::Bronx, "10451", Some(1999), None, None),
        ],
        elevators: vec![
            elevator(1, 1, 1955, None),
            elevator(2, 1, 1981, Some(2001)),
            elevator(3, 3, 1962, Some(1994)),
            elevator(4, 5, 1999, None),
        ],
        violations: vec![
            violation(1, 1, date(2024, 1, 5), "Door Lock", ViolationStatus::Open),
            violation(2, 1, date(2024, 3, 18), "Elevator", ViolationStatus::Open),
            violation(3, 1, date(2022, 11, 2), "Elevator", ViolationStatus::Resolved),
            violation(4, 3, date(2024, 3, 1), "Cable Wear", ViolationStatus::Open),
            violation(5, 4, date(2023, 12, 24), "Elevator", ViolationStatus::Resolved),
        ],
        opportunities: vec![
            opportunity(11, 1, Some(72), OpportunityStatus::Contacted),
            opportunity(12, 2, Some(38), OpportunityStatus::Identified),
            opportunity(13, 3, Some(91), OpportunityStatus::Identified),
            opportunity(14, 4, None, OpportunityStatus::Identified),
        ],
    }
}

fn memory_store(fixture: &Fixture) -> MemoryBuildingStore {
    let store = MemoryBuildingStore::default();
    for record in &fixture.buildings {
        store.insert_building(record.clone()).expect("insert building");
    }
    for record in &fixture.elevators {
        store.insert_elevator(record.clone()).expect("insert elevator");
    }
    for record in &fixture.violations {
        store.insert_violation(record.clone()).expect("insert violation");
    }
    for record in &fixture.opportunities {
        store.insert_opportunity(record.clone()).expect("insert opportunity");
    }
    store
}

async fn seed_postgres(store: &PgBuildingStore, fixture: &Fixture) -> Result<(), sqlx::Error> {
    let pool = store.pool();
    sqlx::query(
        "TRUNCATE opportunities, violations, elevators, buildings RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await?;

    for b in &fixture.buildings {
        sqlx::query(
            "INSERT INTO buildings (id, building_id, address, borough, zip_code, year_built, \
                 floors, units, owner_name, owner_contact, property_manager, last_inspection_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(b.id.0)
        .bind(&b.building_code)
        .bind(&b.address)
        .bind(b.borough.label())
        .bind(&b.zip_code)
        .bind(b.year_built)
        .bind(b.floors)
        .bind(b.units)
        .bind(&b.owner_name)
        .bind(&b.owner_contact)
        .bind(&b.property_manager)
        .bind(b.last_inspection_date)
        .execute(pool)
        .await?;
    }

    for e in &fixture.elevators {
        sqlx::query(
            "INSERT INTO elevators (id, building_id, elevator_id, device_number, type, \
                 manufacturer, year_installed, capacity, floors_served, last_inspection_date, \
                 inspection_status, modernization_year) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(e.id)
        .bind(e.building_id.0)
        .bind(&e.elevator_code)
        .bind(&e.device_number)
        .bind(&e.elevator_type)
        .bind(&e.manufacturer)
        .bind(e.year_installed)
        .bind(e.capacity)
        .bind(e.floors_served)
        .bind(e.last_inspection_date)
        .bind(&e.inspection_status)
        .bind(e.modernization_year)
        .execute(pool)
        .await?;
    }

    for v in &fixture.violations {
        sqlx::query(
            "INSERT INTO violations (id, building_id, violation_id, violation_date, \
                 violation_type, description, severity, status, resolution_date, fine_amount) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(v.id)
        .bind(v.building_id.0)
        .bind(&v.violation_code)
        .bind(v.violation_date)
        .bind(&v.violation_type)
        .bind(&v.description)
        .bind(v.severity.label())
        .bind(v.status.label())
        .bind(v.resolution_date)
        .bind(v.fine_amount)
        .execute(pool)
        .await?;
    }

    for o in &fixture.opportunities {
        sqlx::query(
            "INSERT INTO opportunities (id, building_id, opportunity_score, priority_level, \
                 estimated_value, roi_estimate, payback_period_years, energy_savings_potential, \
                 status, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(o.id.0)
        .bind(o.building_id.0)
        .bind(o.opportunity_score.map(i32::from))
        .bind(o.priority_level.map(PriorityLevel::label))
        .bind(o.estimated_value)
        .bind(o.roi_estimate)
        .bind(o.payback_period_years)
        .bind(o.energy_savings_potential)
        .bind(o.status.label())
        .bind(&o.notes)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn building_filters() -> Vec<BuildingFilter> {
    vec![
        BuildingFilter::default(),
        BuildingFilter {
            borough: Some(Borough::Brooklyn),
            ..BuildingFilter::default()
        },
        BuildingFilter {
            zip_code: Some("10001".to_string()),
            floors_min: Some(10),
            ..BuildingFilter::default()
        },
        BuildingFilter {
            year_built_min: Some(1900),
            year_built_max: Some(1970),
            ..BuildingFilter::default()
        },
        BuildingFilter {
            last_inspection_from: Some(date(2024, 1, 1)),
            last_inspection_to: Some(date(2024, 12, 31)),
            ..BuildingFilter::default()
        },
        BuildingFilter {
            violation_count_min: Some(2),
            ..BuildingFilter::default()
        },
        BuildingFilter {
            violation_count_min: Some(0),
            score_min: Some(0),
            ..BuildingFilter::default()
        },
        BuildingFilter {
            floors_max: Some(25),
            score_min: Some(40),
            ..BuildingFilter::default()
        },
    ]
}

fn opportunity_filters() -> Vec<OpportunityFilter> {
    vec![
        OpportunityFilter::default(),
        OpportunityFilter {
            priority: Some(PriorityLevel::Critical),
            ..OpportunityFilter::default()
        },
        OpportunityFilter {
            status: Some(OpportunityStatus::Identified),
            ..OpportunityFilter::default()
        },
        OpportunityFilter {
            status: Some(OpportunityStatus::Identified),
            score_min: Some(30),
            ..OpportunityFilter::default()
        },
    ]
}

/// Text keys are left out: Postgres orders them by collation.
const SORTS: [SortKey; 6] = [
    SortKey::Score,
    SortKey::YearBuilt,
    SortKey::Floors,
    SortKey::Violations,
    SortKey::Borough,
    SortKey::LastInspection,
];

async fn connect() -> Option<(PgBuildingStore, MemoryBuildingStore)> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return None;
    };
    let store = PgBuildingStore::connect(&url, 2).await.expect("connect");
    store.ensure_schema().await.expect("schema");
    let fixture = fixture();
    seed_postgres(&store, &fixture).await.expect("seed postgres");
    Some((store, memory_store(&fixture)))
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL pointing at a disposable Postgres database"]
async fn listing_queries_match_the_memory_store() {
    let Some((postgres, memory)) = connect().await else {
        return;
    };

    for filter in building_filters() {
        let predicates = PredicateSet::from_filter(&filter);
        assert_eq!(
            postgres.count_matching(&predicates).await.expect("pg count"),
            memory.count_matching(&predicates).await.expect("memory count"),
            "count for {filter:?}"
        );

        for key in SORTS {
            for order in [SortOrder::Asc, SortOrder::Desc] {
                let sort = SortSpec { key, order };
                for window in [
                    PageWindow { limit: 20, offset: 0 },
                    PageWindow { limit: 2, offset: 1 },
                ] {
                    let expected = memory
                        .find_page_with_count(&predicates, sort, window)
                        .await
                        .expect("memory page");
                    let actual = postgres
                        .find_page_with_count(&predicates, sort, window)
                        .await
                        .expect("pg page");
                    assert_eq!(actual, expected, "{filter:?} {sort:?} {window:?}");
                    assert_eq!(
                        postgres
                            .find_page(&predicates, sort, window)
                            .await
                            .expect("pg page"),
                        expected.0
                    );
                }
            }
        }
    }

    for filter in opportunity_filters() {
        let predicates = PredicateSet::from_opportunity_filter(&filter);
        for window in [
            PageWindow { limit: 20, offset: 0 },
            PageWindow { limit: 1, offset: 1 },
        ] {
            let expected = memory
                .find_opportunities_with_count(&predicates, window)
                .await
                .expect("memory pipeline");
            let actual = postgres
                .find_opportunities_with_count(&predicates, window)
                .await
                .expect("pg pipeline");
            assert_eq!(actual, expected, "{filter:?} {window:?}");
            assert_eq!(
                postgres
                    .count_opportunities(&predicates)
                    .await
                    .expect("pg count"),
                expected.1
            );
        }
    }
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL pointing at a disposable Postgres database"]
async fn single_building_and_analytics_reads_match_the_memory_store() {
    let Some((postgres, memory)) = connect().await else {
        return;
    };

    for id in [1, 3, 4, 5, 404].map(BuildingId) {
        assert_eq!(
            postgres.find_building(id).await.expect("pg detail"),
            memory.find_building(id).await.expect("memory detail"),
            "detail {id}"
        );
        assert_eq!(
            postgres.elevators(id).await.expect("pg elevators"),
            memory.elevators(id).await.expect("memory elevators"),
            "elevators {id}"
        );
        assert_eq!(
            postgres.violations(id).await.expect("pg violations"),
            memory.violations(id).await.expect("memory violations"),
            "violations {id}"
        );
        assert_eq!(
            postgres.scoring_facts(id).await.expect("pg facts"),
            memory.scoring_facts(id).await.expect("memory facts"),
            "facts {id}"
        );
    }

    assert_eq!(
        postgres.pipeline_counts().await.expect("pg counts"),
        memory.pipeline_counts().await.expect("memory counts")
    );
    assert_eq!(
        postgres.opportunity_grades().await.expect("pg grades"),
        memory.opportunity_grades().await.expect("memory grades")
    );
    assert_eq!(
        postgres
            .opportunity_financials()
            .await
            .expect("pg financials"),
        memory
            .opportunity_financials()
            .await
            .expect("memory financials")
    );

    let since = date(2023, 12, 1);
    assert_eq!(
        postgres.monthly_violations(since).await.expect("pg trend"),
        memory.monthly_violations(since).await.expect("memory trend")
    );
    let activity = postgres
        .violation_activity(since)
        .await
        .expect("pg activity");
    assert_eq!(
        activity,
        memory
            .violation_activity(since)
            .await
            .expect("memory activity")
    );
    assert_eq!(activity[0].violation_types, vec!["Door Lock", "Elevator"]);
}
