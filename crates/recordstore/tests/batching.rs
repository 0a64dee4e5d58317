mod common;

use common::{Person, Pet, setup};
use proptest::prelude::*;
use recordstore::prelude::*;
use recordstore_memory::StatementKind;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_child_queries_match_page_count(
        pets_per_person in proptest::collection::vec(0_usize..3, 0..40),
        batch in 1_usize..12,
    ) {
        let (schema, conn) = setup();
        let store = Store::<Person, _>::new(&conn, schema).unwrap();
        for (i, count) in pets_per_person.iter().enumerate() {
            let mut person = Person::new(&format!("p{i:02}"), 30);
            for j in 0..*count {
                person.pets.push(Pet::new(&format!("pet{j}"), "cat"));
            }
            store.insert(&mut person).unwrap();
        }
        conn.clear_events();

        let people = store
            .find_all(
                Query::new()
                    .with_relation("pets", None)
                    .batch_size(batch)
                    .order_by(OrderBy::asc("id")),
            )
            .unwrap();

        let n = pets_per_person.len();
        prop_assert_eq!(people.len(), n);
        prop_assert_eq!(
            conn.statement_count_on(StatementKind::Select, "pet"),
            n.div_ceil(batch)
        );
        for (person, expected) in people.iter().zip(&pets_per_person) {
            prop_assert_eq!(person.pets.len(), *expected);
        }
    }

    #[test]
    fn test_filter_matches_in_memory_predicate(
        ages in proptest::collection::vec(proptest::option::of(0_i32..90), 0..30),
        threshold in 0_i32..90,
    ) {
        let (schema, conn) = setup();
        let store = Store::<Person, _>::new(&conn, schema).unwrap();
        for (i, age) in ages.iter().enumerate() {
            let mut person = Person::new(&format!("p{i}"), 0);
            person.age = *age;
            store.insert(&mut person).unwrap();
        }

        let query = Query::new().filter(Expr::col("age").gt(threshold));
        let expected = ages.iter().flatten().filter(|age| **age > threshold).count();
        prop_assert_eq!(store.find_all(query.copy()).unwrap().len(), expected);
        prop_assert_eq!(store.count(&query).unwrap(), expected as u64);
    }
}
