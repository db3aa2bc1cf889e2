//! Renders predicate sets into Postgres statements with positional
//! placeholders.

use super::filter::{PageWindow, SortKey, SortOrder, SortSpec};
use super::predicate::{Column, Predicate, PredicateSet, PredicateValue};

/// Joins shared by the page and count queries.
const FROM_JOINED: &str = "FROM buildings b \
     LEFT JOIN elevators e ON b.id = e.building_id \
     LEFT JOIN violations v ON b.id = v.building_id \
     LEFT JOIN opportunities o ON b.id = o.building_id";

const SUMMARY_COLUMNS: &str = "b.id::int8 AS id, b.building_id AS building_code, b.address, b.borough, \
     b.zip_code, b.year_built, b.floors, b.units, b.owner_name, b.owner_contact, \
     b.property_manager, b.last_inspection_date, \
     COUNT(DISTINCT e.id) AS elevator_count, \
     COUNT(DISTINCT v.id) AS total_violations, \
     COUNT(DISTINCT v.id) FILTER (WHERE v.status = 'Open') AS open_violations, \
     MAX(o.opportunity_score)::int4 AS opportunity_score, \
     MAX(o.priority_level) AS priority_level, \
     MAX(o.estimated_value)::float8 AS estimated_value";

/// Opportunity listing source; every opportunity belongs to one building.
const OPPORTUNITY_JOINED: &str = "FROM opportunities o JOIN buildings b ON o.building_id = b.id";

const LISTING_COLUMNS: &str = "o.id::int8 AS id, o.building_id::int8 AS building_id, \
     o.opportunity_score::int4 AS opportunity_score, o.priority_level, \
     o.estimated_value::float8 AS estimated_value, o.roi_estimate::float8 AS roi_estimate, \
     o.payback_period_years::float8 AS payback_period_years, \
     o.energy_savings_potential::float8 AS energy_savings_potential, o.status, o.notes, \
     b.building_id AS building_code, b.address, b.borough, b.year_built, b.floors, \
     b.owner_name";

const DETAIL_COLUMNS: &str = "MAX(o.id)::int8 AS opportunity_id, \
     MAX(o.roi_estimate)::float8 AS roi_estimate, \
     MAX(o.payback_period_years)::float8 AS payback_period_years, \
     MAX(o.energy_savings_potential)::float8 AS energy_savings_potential, \
     MAX(o.status) AS opportunity_status, \
     MAX(o.notes) AS notes";

/// Statement text plus its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub text: String,
    pub params: Vec<PredicateValue>,
}

/// `WHERE`/`HAVING` fragments, empty when no predicate applies.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPredicates {
    pub where_clause: String,
    pub having_clause: String,
    pub params: Vec<PredicateValue>,
}

pub fn column_expression(column: Column) -> &'static str {
    match column {
        Column::Borough => "b.borough",
        Column::ZipCode => "b.zip_code",
        Column::YearBuilt => "b.year_built",
        Column::Floors => "b.floors",
        Column::LastInspectionDate => "b.last_inspection_date",
        Column::ViolationCount => "COUNT(DISTINCT v.id)",
        Column::OpportunityScore => "MAX(o.opportunity_score)",
        Column::PriorityLevel => "MAX(o.priority_level)",
        Column::OpportunityStatus => "MAX(o.status)",
    }
}

/// Expressions for the ungrouped opportunity listing, where every column
/// is read per row.
pub fn opportunity_column_expression(column: Column) -> &'static str {
    match column {
        Column::ViolationCount => {
            "(SELECT COUNT(*) FROM violations v WHERE v.building_id = b.id)"
        }
        Column::OpportunityScore => "o.opportunity_score",
        Column::PriorityLevel => "o.priority_level",
        Column::OpportunityStatus => "o.status",
        row_column => column_expression(row_column),
    }
}

pub fn sort_expression(key: SortKey) -> &'static str {
    match key {
        SortKey::Score => "opportunity_score",
        SortKey::YearBuilt => "b.year_built",
        SortKey::Floors => "b.floors",
        SortKey::Violations => "total_violations",
        SortKey::Address => "b.address",
        SortKey::Borough => "b.borough",
        SortKey::LastInspection => "b.last_inspection_date",
    }
}

fn join_conditions(
    predicates: &[Predicate],
    expression: fn(Column) -> &'static str,
    next_index: &mut usize,
) -> String {
    predicates
        .iter()
        .map(|predicate| {
            let condition = format!(
                "{} {} ${}",
                expression(predicate.column),
                predicate.comparison.operator(),
                next_index
            );
            *next_index += 1;
            condition
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn render_predicates(set: &PredicateSet) -> RenderedPredicates {
    let mut next_index = 1;

    let row = join_conditions(set.row(), column_expression, &mut next_index);
    let aggregate = join_conditions(set.aggregate(), column_expression, &mut next_index);

    RenderedPredicates {
        where_clause: if row.is_empty() {
            String::new()
        } else {
            format!(" WHERE {row}")
        },
        having_clause: if aggregate.is_empty() {
            String::new()
        } else {
            format!(" HAVING {aggregate}")
        },
        params: set.params().cloned().collect(),
    }
}

fn grouped_query(select: &str, rendered: &RenderedPredicates) -> String {
    format!(
        "SELECT {select} {FROM_JOINED}{} GROUP BY b.id{}",
        rendered.where_clause, rendered.having_clause
    )
}

/// One page of enriched building rows.
pub fn page_query(set: &PredicateSet, sort: SortSpec, window: PageWindow) -> SqlStatement {
    let mut rendered = render_predicates(set);
    let mut params = std::mem::take(&mut rendered.params);

    let direction = match sort.order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    let limit_index = params.len() + 1;
    let text = format!(
        "{} ORDER BY {} {direction} NULLS LAST, b.id ASC LIMIT ${limit_index} OFFSET ${}",
        grouped_query(SUMMARY_COLUMNS, &rendered),
        sort_expression(sort.key),
        limit_index + 1
    );

    params.push(PredicateValue::Int(i64::from(window.limit)));
    params.push(PredicateValue::Int(
        i64::try_from(window.offset).unwrap_or(i64::MAX),
    ));

    SqlStatement { text, params }
}

/// Summary columns plus the financial side of the opportunity for one id.
pub fn detail_query(id: i64) -> SqlStatement {
    let text = format!(
        "SELECT {SUMMARY_COLUMNS}, {DETAIL_COLUMNS} {FROM_JOINED} WHERE b.id = $1 GROUP BY b.id"
    );
    SqlStatement {
        text,
        params: vec![PredicateValue::Int(id)],
    }
}

/// Number of buildings matching the same predicates, ignoring the window.
pub fn count_query(set: &PredicateSet) -> SqlStatement {
    let rendered = render_predicates(set);
    let text = format!(
        "SELECT COUNT(*) FROM ({}) AS filtered",
        grouped_query("b.id", &rendered)
    );
    SqlStatement {
        text,
        params: rendered.params,
    }
}

/// Ungrouped `WHERE` over both predicate lists, in parameter order.
fn opportunity_where(set: &PredicateSet) -> String {
    let mut next_index = 1;
    let conditions: Vec<String> = [set.row(), set.aggregate()]
        .into_iter()
        .map(|predicates| {
            join_conditions(predicates, opportunity_column_expression, &mut next_index)
        })
        .filter(|condition| !condition.is_empty())
        .collect();

    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// One page of the opportunity pipeline.
pub fn opportunity_page_query(set: &PredicateSet, window: PageWindow) -> SqlStatement {
    let mut params: Vec<PredicateValue> = set.params().cloned().collect();
    let limit_index = params.len() + 1;
    let text = format!(
        "SELECT {LISTING_COLUMNS} {OPPORTUNITY_JOINED}{} \
         ORDER BY o.opportunity_score DESC NULLS LAST, o.id ASC LIMIT ${limit_index} OFFSET ${}",
        opportunity_where(set),
        limit_index + 1
    );

    params.push(PredicateValue::Int(i64::from(window.limit)));
    params.push(PredicateValue::Int(
        i64::try_from(window.offset).unwrap_or(i64::MAX),
    ));

    SqlStatement { text, params }
}

pub fn opportunity_count_query(set: &PredicateSet) -> SqlStatement {
    SqlStatement {
        text: format!(
            "SELECT COUNT(*) {OPPORTUNITY_JOINED}{}",
            opportunity_where(set)
        ),
        params: set.params().cloned().collect(),
    }
}
