use super::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// -----------------------------------------------------------------------
// parse_number
// -----------------------------------------------------------------------

#[test]
fn spanish_grouping_and_decimals() {
    let es = NumberLocale::Es;
    assert_eq!(parse_number("245.000", es).unwrap(), 245_000.0);
    assert_eq!(parse_number("1.234.567", es).unwrap(), 1_234_567.0);
    assert_eq!(parse_number("1.234,5", es).unwrap(), 1_234.5);
    assert_eq!(parse_number("85,5 m²", es).unwrap(), 85.5);
}

#[test]
fn english_grouping_and_decimals() {
    let en = NumberLocale::En;
    assert_eq!(parse_number("1,250", en).unwrap(), 1_250.0);
    assert_eq!(parse_number("1,234.5", en).unwrap(), 1_234.5);
    assert_eq!(parse_number("72.5", en).unwrap(), 72.5);
}

#[test]
fn space_grouped_numbers() {
    assert_eq!(
        parse_number("2\u{a0}450\u{a0}000 kr", NumberLocale::Es).unwrap(),
        2_450_000.0
    );
}

#[test]
fn number_errors() {
    assert_eq!(
        parse_number("   ", NumberLocale::Es),
        Err(NormalizationError::Empty)
    );
    assert!(matches!(
        parse_number("A consultar", NumberLocale::Es),
        Err(NormalizationError::NotNumeric { .. })
    ));
}

// -----------------------------------------------------------------------
// parse_price
// -----------------------------------------------------------------------

#[test]
fn sale_price_in_euros() {
    let price = parse_price("245.000 €", NumberLocale::Es).unwrap();
    assert_eq!(price.amount, 245_000.0);
    assert_eq!(price.currency, Currency::Eur);
    assert_eq!(price.period, None);
}

#[test]
fn monthly_rent() {
    let price = parse_price("1.250 €/mes", NumberLocale::Es).unwrap();
    assert_eq!(price.amount, 1_250.0);
    assert_eq!(price.period, Some(PricePeriod::Monthly));
}

#[test]
fn currency_falls_back_to_locale() {
    assert_eq!(
        parse_price("350,000", NumberLocale::En).unwrap().currency,
        Currency::Usd
    );
    assert_eq!(
        parse_price("350.000", NumberLocale::Es).unwrap().currency,
        Currency::Eur
    );
}

#[test]
fn zero_price_is_out_of_range() {
    assert!(matches!(
        parse_price("0 €", NumberLocale::Es),
        Err(NormalizationError::OutOfRange { .. })
    ));
}

// -----------------------------------------------------------------------
// area / rooms / bathrooms / floor
// -----------------------------------------------------------------------

#[test]
fn area_units() {
    assert_eq!(parse_area("85 m²", NumberLocale::Es).unwrap(), 85.0);
    assert_eq!(parse_area("120 m2 construidos", NumberLocale::Es).unwrap(), 120.0);
    let converted = parse_area("1,000 sq ft", NumberLocale::En).unwrap();
    assert!((converted - 92.903).abs() < 1e-6);
    assert!(matches!(
        parse_area("85", NumberLocale::Es),
        Err(NormalizationError::UnknownUnit { .. })
    ));
}

#[test]
fn rooms_and_studios() {
    assert_eq!(parse_rooms("3 hab.").unwrap(), 3);
    assert_eq!(parse_rooms("4 habitaciones").unwrap(), 4);
    assert_eq!(parse_rooms("2 bedrooms").unwrap(), 2);
    assert_eq!(parse_rooms("Estudio").unwrap(), 0);
    assert!(looks_like_rooms("3 hab."));
    assert!(!looks_like_rooms("85 m²"));
}

#[test]
fn bathrooms() {
    assert_eq!(parse_bathrooms("2 baños").unwrap(), 2);
    assert_eq!(parse_bathrooms("1 bathroom").unwrap(), 1);
    assert!(!looks_like_bathrooms("3 hab."));
}

#[test]
fn floors() {
    assert_eq!(parse_floor("Planta 2ª exterior").unwrap(), Floor::Level(2));
    assert_eq!(parse_floor("3ª planta").unwrap(), Floor::Level(3));
    assert_eq!(parse_floor("Bajo exterior").unwrap(), Floor::Level(0));
    assert_eq!(parse_floor("Sótano").unwrap(), Floor::Level(-1));
    assert_eq!(
        parse_floor("Entreplanta").unwrap(),
        Floor::Named("entreplanta".into())
    );
    assert!(looks_like_floor("Planta 2ª exterior con ascensor"));
    assert!(!looks_like_floor("85 m²"));
}

// -----------------------------------------------------------------------
// property type / location
// -----------------------------------------------------------------------

#[test]
fn property_types_from_titles() {
    assert_eq!(
        parse_property_type("Piso en Calle de Atocha").unwrap(),
        PropertyType::Flat
    );
    assert_eq!(
        parse_property_type("Casa rural en Cercedilla").unwrap(),
        PropertyType::CountryHouse
    );
    assert_eq!(
        parse_property_type("Casa o chalet independiente en Aravaca").unwrap(),
        PropertyType::House
    );
    assert_eq!(
        parse_property_type("Ático en Chamberí").unwrap(),
        PropertyType::Penthouse
    );
    assert!(matches!(
        parse_property_type("Garaje en Tetuán"),
        Err(NormalizationError::UnknownPropertyType { .. })
    ));
}

#[test]
fn title_style_location() {
    let location =
        parse_location(&["Calle de Atocha", "Embajadores-Lavapiés", "Madrid"]).unwrap();
    assert_eq!(location.street.as_deref(), Some("Calle de Atocha"));
    assert_eq!(location.neighborhood.as_deref(), Some("Embajadores-Lavapiés"));
    assert_eq!(location.district, None);
    assert_eq!(location.city.as_deref(), Some("Madrid"));
}

#[test]
fn labelled_location_takes_first_plain_part_as_city() {
    let location = parse_location(&[
        "Calle de Atocha",
        "Barrio Embajadores-Lavapiés",
        "Distrito Centro",
        "Madrid",
        "Madrid capital, Madrid",
    ])
    .unwrap();
    assert_eq!(location.neighborhood.as_deref(), Some("Embajadores-Lavapiés"));
    assert_eq!(location.district.as_deref(), Some("Centro"));
    assert_eq!(location.city.as_deref(), Some("Madrid"));
}

#[test]
fn empty_location_is_an_error() {
    let parts: [&str; 2] = ["", "  "];
    assert_eq!(parse_location(&parts), Err(NormalizationError::Empty));
}

// -----------------------------------------------------------------------
// parse_published_at
// -----------------------------------------------------------------------

#[test]
fn absolute_dates() {
    let today = date(2024, 6, 1);
    assert_eq!(parse_published_at("2024-03-12", today).unwrap(), date(2024, 3, 12));
    assert_eq!(parse_published_at("12/03/2024", today).unwrap(), date(2024, 3, 12));
    assert_eq!(
        parse_published_at("Anuncio actualizado el 5 de enero de 2023", today).unwrap(),
        date(2023, 1, 5)
    );
}

#[test]
fn yearless_date_never_lies_in_the_future() {
    let today = date(2024, 2, 1);
    assert_eq!(
        parse_published_at("Anuncio actualizado el 12 de marzo", today).unwrap(),
        date(2023, 3, 12)
    );
    assert_eq!(
        parse_published_at("actualizado el 20 de enero", today).unwrap(),
        date(2024, 1, 20)
    );
}

#[test]
fn relative_dates() {
    let today = date(2024, 6, 10);
    assert_eq!(parse_published_at("hace 3 días", today).unwrap(), date(2024, 6, 7));
    assert_eq!(parse_published_at("Actualizado hoy", today).unwrap(), today);
    assert_eq!(parse_published_at("ayer", today).unwrap(), date(2024, 6, 9));
    assert!(matches!(
        parse_published_at("la semana pasada", today),
        Err(NormalizationError::UnrecognizedDate { .. })
    ));
}

// -----------------------------------------------------------------------
// parse_features
// -----------------------------------------------------------------------

#[test]
fn amenity_flags() {
    let features = parse_features([
        "Planta 2ª exterior con ascensor",
        "Terraza",
        "Armarios empotrados",
        "Sin amueblar",
    ]);
    assert!(features.contains(&Feature::Elevator));
    assert!(features.contains(&Feature::Exterior));
    assert!(features.contains(&Feature::Terrace));
    assert!(features.contains(&Feature::BuiltInWardrobes));
    assert!(!features.contains(&Feature::Furnished));
}

#[test]
fn negated_elevator_is_not_a_feature() {
    let features = parse_features(["Bajo exterior sin ascensor"]);
    assert!(!features.contains(&Feature::Elevator));
    assert!(features.contains(&Feature::Exterior));
}

#[test]
fn garage_only_when_included() {
    let included = parse_features(["Plaza de garaje incluida en el precio"]);
    assert!(included.contains(&Feature::Garage));
    assert!(parse_features(["Garaje incluido"]).contains(&Feature::Garage));

    let optional = parse_features(["Plaza de garaje opcional por 20.000 €"]);
    assert!(!optional.contains(&Feature::Garage));
    assert!(!parse_features(["Sin garaje"]).contains(&Feature::Garage));
}

#[test]
fn equipped_kitchen_flag() {
    assert!(parse_features(["Cocina equipada"]).contains(&Feature::EquippedKitchen));
    assert!(!parse_features(["Cocina sin equipar"]).contains(&Feature::EquippedKitchen));
}

// -----------------------------------------------------------------------
// building details from the "basic features" list
// -----------------------------------------------------------------------

#[test]
fn usable_area_is_taken_after_built_area() {
    let raw = "85 m² construidos, 78 m² útiles";
    assert!(looks_like_usable_area(raw));
    assert_eq!(parse_usable_area(raw, NumberLocale::Es).unwrap(), 78.0);
    assert_eq!(parse_area(raw, NumberLocale::Es).unwrap(), 85.0);
}

#[test]
fn plot_and_usable_only_items_are_not_built_area() {
    assert!(looks_like_area("85 m² construidos, 78 m² útiles"));
    assert!(!looks_like_area("78 m² útiles"));
    assert!(!looks_like_area("Parcela de 500 m²"));
}

#[test]
fn plot_area_with_grouping() {
    assert_eq!(
        parse_plot_area("Parcela de 1.200 m²", NumberLocale::Es).unwrap(),
        1200.0
    );
    assert!(matches!(
        parse_plot_area("Parcela urbanizable", NumberLocale::Es),
        Err(NormalizationError::NotNumeric { .. })
    ));
}

#[test]
fn storey_count() {
    assert!(looks_like_storeys("3 plantas"));
    assert!(!looks_like_storeys("Planta 3ª"));
    assert_eq!(parse_storeys("3 plantas").unwrap(), 3);
}

#[test]
fn construction_year() {
    assert_eq!(parse_construction_year("Construido en 1975").unwrap(), 1975);
    assert!(matches!(
        parse_construction_year("Construido en 0975"),
        Err(NormalizationError::OutOfRange { .. })
    ));
}

#[test]
fn orientation_points() {
    assert_eq!(
        parse_orientation("Orientación norte, sur y oeste").unwrap(),
        vec![Orientation::North, Orientation::South, Orientation::West]
    );
    assert_eq!(
        parse_orientation("Orientación sureste").unwrap(),
        vec![Orientation::SouthEast]
    );
    assert!(matches!(
        parse_orientation("Orientación cualquiera"),
        Err(NormalizationError::Unrecognized { .. })
    ));
    assert_eq!(parse_orientation("Orientación"), Err(NormalizationError::Empty));
}

#[test]
fn heating_description() {
    assert_eq!(
        parse_heating("Calefacción individual: Gas natural").unwrap(),
        "individual: Gas natural"
    );
    assert_eq!(parse_heating("Calefacción central").unwrap(), "central");
    assert_eq!(parse_heating("Sin calefacción").unwrap(), "none");
    assert!(looks_like_heating("Sin calefacción"));
    assert!(parse_heating("Calefacción").is_err());
}

#[test]
fn condition_variants() {
    assert_eq!(
        parse_condition("Segunda mano/buen estado").unwrap(),
        Condition::Good
    );
    assert_eq!(
        parse_condition("Segunda mano/para reformar").unwrap(),
        Condition::NeedsRenovation
    );
    assert_eq!(
        parse_condition("Promoción de obra nueva").unwrap(),
        Condition::NewBuild
    );
    assert!(parse_condition("Segunda mano").is_err());
}

#[test]
fn reference_label_is_stripped() {
    assert_eq!(parse_reference("Ref. 10234567").unwrap(), "10234567");
    assert_eq!(
        parse_reference("Referencia del anuncio: MAD-0042").unwrap(),
        "MAD-0042"
    );
    assert_eq!(parse_reference("AB12").unwrap(), "AB12");
    assert_eq!(parse_reference("Ref."), Err(NormalizationError::Empty));
}
