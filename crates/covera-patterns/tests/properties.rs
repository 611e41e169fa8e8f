//! Property tests for the exhaustiveness engine.
//!
//! Small hierarchies are checked against a brute-force model that
//! enumerates every runtime value of the selector type.

use covera_patterns::*;
use covera_types::{ClassDecl, ClassId, Type, TypeUniverse, UniverseBuilder};
use pretty_assertions::assert_eq;

/// Shape = Circle | Square | Polygon, Polygon = Triangle | Hexagon
fn polygons() -> TypeUniverse {
    UniverseBuilder::new()
        .declare(ClassDecl::interface("Shape").sealed())
        .declare(ClassDecl::record("Circle").implements(["Shape"]))
        .declare(ClassDecl::record("Square").implements(["Shape"]))
        .declare(
            ClassDecl::interface("Polygon")
                .sealed()
                .implements(["Shape"]),
        )
        .declare(ClassDecl::record("Triangle").implements(["Polygon"]))
        .declare(ClassDecl::record("Hexagon").implements(["Polygon"]))
        .declare(ClassDecl::record("Pair").components(["Shape", "Shape"]))
        .build()
        .unwrap()
}

/// I = C | D, Triple(I, I, I)
fn triples() -> TypeUniverse {
    UniverseBuilder::new()
        .declare(ClassDecl::interface("I").sealed())
        .declare(ClassDecl::record("C").implements(["I"]))
        .declare(ClassDecl::record("D").implements(["I"]))
        .declare(ClassDecl::record("Triple").components(["I", "I", "I"]))
        .build()
        .unwrap()
}

#[derive(Debug, Clone)]
struct Value {
    class: ClassId,
    components: Vec<Value>,
}

fn values_of(universe: &TypeUniverse, ty: &Type) -> Vec<Value> {
    let Some(target) = ty.class_id() else {
        return Vec::new();
    };
    let mut values = Vec::new();
    for (class, def) in universe.classes() {
        if def.is_abstract || !universe.is_subclass(class, target) {
            continue;
        }
        let component_types = universe
            .record_component_types(&Type::class(class))
            .unwrap_or_default();
        let mut combinations: Vec<Vec<Value>> = vec![Vec::new()];
        for component_ty in &component_types {
            let options = values_of(universe, component_ty);
            combinations = combinations
                .into_iter()
                .flat_map(|prefix| {
                    options.iter().map(move |value| {
                        let mut next = prefix.clone();
                        next.push(value.clone());
                        next
                    })
                })
                .collect();
        }
        values.extend(
            combinations
                .into_iter()
                .map(|components| Value { class, components }),
        );
    }
    values
}

fn matches(universe: &TypeUniverse, pattern: &PatternDescription, value: &Value) -> bool {
    match pattern {
        PatternDescription::TypeTest(ty) => ty
            .class()
            .is_some_and(|class| universe.is_subclass(value.class, class)),
        PatternDescription::Deconstruction(deconstruction) => {
            deconstruction.ty().class() == Some(value.class)
                && deconstruction
                    .components()
                    .iter()
                    .zip(&value.components)
                    .all(|(component, inner)| matches(universe, component, inner))
        }
    }
}

fn covers_all(universe: &TypeUniverse, selector: &Type, patterns: &[PatternDescription]) -> bool {
    values_of(universe, selector)
        .iter()
        .all(|value| {
            patterns
                .iter()
                .any(|pattern| matches(universe, pattern, value))
        })
}

fn tt(universe: &TypeUniverse, name: &str) -> PatternDescription {
    PatternDescription::type_test(universe, universe.class_type(name).unwrap())
}

fn pair(universe: &TypeUniverse, a: &str, b: &str) -> PatternDescription {
    PatternDescription::deconstruction(
        universe,
        universe.class_type("Pair").unwrap(),
        vec![tt(universe, a), tt(universe, b)],
    )
    .unwrap()
}

fn labels(patterns: &[PatternDescription]) -> Vec<CaseLabel> {
    patterns.iter().cloned().map(CaseLabel::pattern).collect()
}

fn sealed_pool(universe: &TypeUniverse) -> Vec<PatternDescription> {
    let circle_record =
        PatternDescription::deconstruction(universe, universe.class_type("Circle").unwrap(), vec![])
            .unwrap();
    vec![
        tt(universe, "Circle"),
        tt(universe, "Square"),
        tt(universe, "Polygon"),
        tt(universe, "Triangle"),
        tt(universe, "Hexagon"),
        circle_record,
    ]
}

fn pair_pool(universe: &TypeUniverse) -> Vec<PatternDescription> {
    let names = ["Circle", "Square", "Polygon", "Triangle", "Shape"];
    names
        .iter()
        .flat_map(|a| names.iter().map(move |b| (*a, *b)))
        .map(|(a, b)| pair(universe, a, b))
        .collect()
}

/// `"CID"` spells `Triple(C, I, D)`.
fn triple(universe: &TypeUniverse, spelled: &str) -> PatternDescription {
    let components = spelled
        .chars()
        .map(|name| tt(universe, &name.to_string()))
        .collect();
    PatternDescription::deconstruction(universe, universe.class_type("Triple").unwrap(), components)
        .unwrap()
}

fn triple_pool(universe: &TypeUniverse) -> Vec<PatternDescription> {
    let mut pool = Vec::new();
    for a in ['I', 'C', 'D'] {
        for b in ['I', 'C', 'D'] {
            for c in ['I', 'C', 'D'] {
                pool.push(triple(universe, &format!("{a}{b}{c}")));
            }
        }
    }
    pool
}

fn subsets(pool: &[PatternDescription]) -> Vec<Vec<PatternDescription>> {
    (0u32..1 << pool.len())
        .map(|mask| {
            pool.iter()
                .enumerate()
                .filter(|(index, _)| mask & (1 << index) != 0)
                .map(|(_, pattern)| pattern.clone())
                .collect()
        })
        .collect()
}

/// Deterministic xorshift-chosen subsets of at most `max_len` patterns.
fn sampled_subsets(
    pool: &[PatternDescription],
    count: usize,
    max_len: usize,
) -> Vec<Vec<PatternDescription>> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };
    (0..count)
        .map(|_| {
            let len = 1 + (next() as usize) % max_len;
            (0..len)
                .map(|_| pool[(next() as usize) % pool.len()].clone())
                .collect()
        })
        .collect()
}

fn branch_label(branch: &MissingBranch) -> CaseLabel {
    match branch {
        MissingBranch::Pattern(pattern) => CaseLabel::pattern(pattern.clone()),
        MissingBranch::EnumConstant { class, name } => {
            CaseLabel::enum_constant(*class, name.clone())
        }
        MissingBranch::BoolConstant(value) => CaseLabel::Constant(ConstantValue::Bool(*value)),
        MissingBranch::Default => CaseLabel::Default,
    }
}

#[test]
fn test_sealed_verdicts_agree_with_brute_force() {
    let universe = polygons();
    let config = ExhaustivenessConfig::default();
    let cache = ExhaustivenessCache::new();
    let ctx = CoverageContext::new(&universe, &config, &cache);
    let shape = universe.class_type("Shape").unwrap();

    for patterns in subsets(&sealed_pool(&universe)) {
        let verdict = check_exhaustiveness(&ctx, &shape, &labels(&patterns));
        assert_eq!(
            verdict.is_exhaustive(),
            covers_all(&universe, &shape, &patterns),
            "verdict {verdict:?} for {patterns:?}"
        );
    }
}

#[test]
fn test_missing_branches_complete_the_switch() {
    let universe = polygons();
    let config = ExhaustivenessConfig::default();
    let cache = ExhaustivenessCache::new();
    let ctx = CoverageContext::new(&universe, &config, &cache);
    let shape = universe.class_type("Shape").unwrap();

    for patterns in subsets(&sealed_pool(&universe)) {
        let mut labels = labels(&patterns);
        let verdict = check_exhaustiveness(&ctx, &shape, &labels);
        if let Verdict::Incomplete(branches) = &verdict {
            labels.extend(branches.iter().map(branch_label));
            assert!(
                check_exhaustiveness(&ctx, &shape, &labels).is_exhaustive(),
                "adding {branches:?} to {patterns:?}"
            );
        }
    }

    let pair_ty = universe.class_type("Pair").unwrap();
    let diagonal = [
        pair(&universe, "Circle", "Circle"),
        pair(&universe, "Square", "Shape"),
    ];
    let mut labels = labels(&diagonal);
    let verdict = check_exhaustiveness(&ctx, &pair_ty, &labels);
    assert!(!verdict.missing().is_empty());
    labels.extend(verdict.missing().iter().map(branch_label));
    assert!(check_exhaustiveness(&ctx, &pair_ty, &labels).is_exhaustive());
}

#[test]
fn test_record_verdicts_are_sound() {
    let universe = polygons();
    let config = ExhaustivenessConfig::default();
    let cache = ExhaustivenessCache::new();
    let ctx = CoverageContext::new(&universe, &config, &cache);
    let pair_ty = universe.class_type("Pair").unwrap();

    for patterns in sampled_subsets(&pair_pool(&universe), 300, 8) {
        let verdict = check_exhaustiveness(&ctx, &pair_ty, &labels(&patterns));
        if verdict.is_exhaustive() {
            assert!(
                covers_all(&universe, &pair_ty, &patterns),
                "unsound verdict for {patterns:?}"
            );
        }
    }

    let leaves = ["Circle", "Square", "Triangle", "Hexagon"];
    let grid: Vec<PatternDescription> = leaves
        .iter()
        .flat_map(|a| leaves.iter().map(move |b| (*a, *b)))
        .map(|(a, b)| pair(&universe, a, b))
        .collect();
    assert!(covers_all(&universe, &pair_ty, &grid));
    assert!(check_exhaustiveness(&ctx, &pair_ty, &labels(&grid)).is_exhaustive());
}

#[test]
fn test_adding_patterns_keeps_exhaustive_switches_exhaustive() {
    let universe = polygons();
    let config = ExhaustivenessConfig::default();
    let cache = ExhaustivenessCache::new();
    let ctx = CoverageContext::new(&universe, &config, &cache);
    let shape = universe.class_type("Shape").unwrap();
    let pool = sealed_pool(&universe);

    for patterns in subsets(&pool) {
        if !check_exhaustiveness(&ctx, &shape, &labels(&patterns)).is_exhaustive() {
            continue;
        }
        for extra in &pool {
            let mut grown = patterns.clone();
            grown.push(extra.clone());
            assert!(
                check_exhaustiveness(&ctx, &shape, &labels(&grown)).is_exhaustive(),
                "adding {extra:?} to {patterns:?}"
            );
        }
    }

    let pair_ty = universe.class_type("Pair").unwrap();
    let grid = [
        pair(&universe, "Circle", "Circle"),
        pair(&universe, "Circle", "Square"),
        pair(&universe, "Circle", "Polygon"),
        pair(&universe, "Square", "Shape"),
        pair(&universe, "Polygon", "Shape"),
    ];
    assert!(check_exhaustiveness(&ctx, &pair_ty, &labels(&grid)).is_exhaustive());
    for extra in pair_pool(&universe) {
        let mut grown = grid.to_vec();
        grown.push(extra.clone());
        assert!(
            check_exhaustiveness(&ctx, &pair_ty, &labels(&grown)).is_exhaustive(),
            "adding {extra:?}"
        );
    }
}

#[test]
fn test_reduction_is_deterministic_and_contracting() {
    let universe = polygons();
    let config = ExhaustivenessConfig::default();
    let pair_ty = universe.class_type("Pair").unwrap();

    for patterns in sampled_subsets(&pair_pool(&universe), 200, 6) {
        let set: PatternSet = patterns.into_iter().collect();

        let warm = ExhaustivenessCache::new();
        let ctx = CoverageContext::new(&universe, &config, &warm);
        let first = reduce(&ctx, &pair_ty, &set).unwrap();
        let second = reduce(&ctx, &pair_ty, &set).unwrap();
        assert_eq!(first, second);

        let cold = ExhaustivenessCache::new();
        let fresh = CoverageContext::new(&universe, &config, &cold);
        assert_eq!(reduce(&fresh, &pair_ty, &set).unwrap(), first);

        if first.changed {
            assert!(first.patterns.len() <= set.len());
        } else {
            assert_eq!(first.patterns, set);
        }
    }
}

#[test]
fn test_warm_and_cold_caches_agree() {
    let universe = polygons();
    let config = ExhaustivenessConfig::default();
    let shared = ExhaustivenessCache::new();
    let shape = universe.class_type("Shape").unwrap();
    let pair_ty = universe.class_type("Pair").unwrap();

    let mut queries: Vec<(Type, Vec<PatternDescription>)> = subsets(&sealed_pool(&universe))
        .into_iter()
        .map(|patterns| (shape.clone(), patterns))
        .collect();
    queries.extend(
        sampled_subsets(&pair_pool(&universe), 60, 6)
            .into_iter()
            .map(|patterns| (pair_ty.clone(), patterns)),
    );

    for round in 0..2 {
        for (selector, patterns) in &queries {
            let warm_ctx = CoverageContext::new(&universe, &config, &shared);
            let warm = check_exhaustiveness(&warm_ctx, selector, &labels(patterns));

            let cold_cache = ExhaustivenessCache::new();
            let cold_ctx = CoverageContext::new(&universe, &config, &cold_cache);
            let cold = check_exhaustiveness(&cold_ctx, selector, &labels(patterns));
            assert_eq!(warm, cold, "round {round} for {patterns:?}");
        }
    }
    assert!(!shared.is_empty());
}

#[test]
fn test_shared_cache_across_threads() {
    let universe = polygons();
    let config = ExhaustivenessConfig::default();
    let cache = ExhaustivenessCache::new();
    let pair_ty = universe.class_type("Pair").unwrap();
    let queries = sampled_subsets(&pair_pool(&universe), 40, 6);

    let expected: Vec<Verdict> = {
        let cold = ExhaustivenessCache::new();
        let ctx = CoverageContext::new(&universe, &config, &cold);
        queries
            .iter()
            .map(|patterns| check_exhaustiveness(&ctx, &pair_ty, &labels(patterns)))
            .collect()
    };

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let ctx = CoverageContext::new(&universe, &config, &cache);
                    queries
                        .iter()
                        .map(|patterns| check_exhaustiveness(&ctx, &pair_ty, &labels(patterns)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_triple_verdicts_agree_with_brute_force() {
    let universe = triples();
    let config = ExhaustivenessConfig::default();
    let cache = ExhaustivenessCache::new();
    let ctx = CoverageContext::new(&universe, &config, &cache);
    let selector = universe.class_type("Triple").unwrap();

    let (mut exhaustive, mut incomplete) = (0, 0);
    for patterns in sampled_subsets(&triple_pool(&universe), 1_000, 9) {
        let verdict = check_exhaustiveness(&ctx, &selector, &labels(&patterns));
        if covers_all(&universe, &selector, &patterns) {
            assert_eq!(verdict, Verdict::Exhaustive, "for {patterns:?}");
            exhaustive += 1;
        } else {
            assert!(
                matches!(&verdict, Verdict::Incomplete(branches) if !branches.is_empty()),
                "verdict {verdict:?} for {patterns:?}"
            );
            incomplete += 1;
        }
    }
    assert!(exhaustive > 0 && incomplete > 0);
}

#[test]
fn test_triple_missing_branches_are_complete_and_necessary() {
    let universe = triples();
    let config = ExhaustivenessConfig::default();
    let cache = ExhaustivenessCache::new();
    let ctx = CoverageContext::new(&universe, &config, &cache);
    let selector = universe.class_type("Triple").unwrap();

    for patterns in sampled_subsets(&triple_pool(&universe), 600, 8) {
        let Verdict::Incomplete(branches) =
            check_exhaustiveness(&ctx, &selector, &labels(&patterns))
        else {
            continue;
        };
        let completed: Vec<PatternDescription> = patterns
            .iter()
            .cloned()
            .chain(branches.iter().filter_map(|branch| match branch {
                MissingBranch::Pattern(pattern) => Some(pattern.clone()),
                _ => None,
            }))
            .collect();
        assert_eq!(completed.len(), patterns.len() + branches.len());
        assert!(
            covers_all(&universe, &selector, &completed),
            "adding {branches:?} to {patterns:?}"
        );
        assert!(check_exhaustiveness(&ctx, &selector, &labels(&completed)).is_exhaustive());

        for skipped in patterns.len()..completed.len() {
            let mut partial = completed.clone();
            partial.remove(skipped);
            assert!(
                !covers_all(&universe, &selector, &partial),
                "{:?} is redundant for {patterns:?}",
                completed[skipped]
            );
        }
    }
}

#[test]
fn test_triple_labels_keep_exhaustive_switches_exhaustive() {
    let universe = triples();
    let config = ExhaustivenessConfig::default();
    let cache = ExhaustivenessCache::new();
    let ctx = CoverageContext::new(&universe, &config, &cache);
    let selector = universe.class_type("Triple").unwrap();
    let pool = triple_pool(&universe);

    let mut checked = 0;
    for patterns in sampled_subsets(&pool, 400, 9) {
        if !check_exhaustiveness(&ctx, &selector, &labels(&patterns)).is_exhaustive() {
            continue;
        }
        checked += 1;
        for extra in &pool {
            let mut grown = patterns.clone();
            grown.push(extra.clone());
            assert!(
                check_exhaustiveness(&ctx, &selector, &labels(&grown)).is_exhaustive(),
                "adding {extra:?} to {patterns:?}"
            );
        }
    }
    assert!(checked > 0);
}

#[test]
fn test_triple_switches_decided_by_every_component() {
    let universe = triples();
    let config = ExhaustivenessConfig::default();
    let cache = ExhaustivenessCache::new();
    let ctx = CoverageContext::new(&universe, &config, &cache);
    let selector = universe.class_type("Triple").unwrap();
    let spelled = |names: &[&str]| -> Vec<PatternDescription> {
        names.iter().map(|name| triple(&universe, name)).collect()
    };

    let base = spelled(&["IIC", "DID", "IDD", "CCI", "CCD"]);
    let mut grown = base.clone();
    grown.push(triple(&universe, "DII"));
    for patterns in [&base, &grown] {
        assert_eq!(
            check_exhaustiveness(&ctx, &selector, &labels(patterns)),
            Verdict::Exhaustive
        );
    }

    let covered = spelled(&["ICD", "CCI", "IDC", "ICC", "CDI", "DDI"]);
    assert!(covers_all(&universe, &selector, &covered));
    assert_eq!(
        check_exhaustiveness(&ctx, &selector, &labels(&covered)),
        Verdict::Exhaustive
    );

    let short = spelled(&["DDC", "DCD", "IDC", "DDD", "CIC", "DCC"]);
    let verdict = check_exhaustiveness(&ctx, &selector, &labels(&short));
    assert!(!verdict.missing().is_empty());
    let mut completed = labels(&short);
    completed.extend(verdict.missing().iter().map(branch_label));
    assert!(check_exhaustiveness(&ctx, &selector, &completed).is_exhaustive());
}
