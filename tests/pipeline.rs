//! Pruebas de extremo a extremo: fuente IOML → ensamblador.

use pretty_assertions::assert_eq;

use iomlc::codegen;
use iomlc::lex::Lexer;
use iomlc::parse;

fn compile(source: &str) -> String {
    let tokens = Lexer::new(source, "test.ioml")
        .try_exhaustive()
        .expect("lexer");

    let mut unit = parse::parse("test.ioml", tokens).expect("parser");
    unit.fix().expect("state resolution");
    unit.reduce();

    let mut output = Vec::new();
    codegen::emit(&unit, &mut output).expect("emit");
    String::from_utf8(output).expect("utf8")
}

const BLINKER: &str = "\
reg porta = 0x40000000;
sig boton = porta[2];
var cuenta;

auto parpadeo {
    init { cuenta = 0; }

    state espera {
        entry { porta = 0; }
        when boton { goto activo; }
        when !boton { cuenta = cuenta + 1; }
    }

    state activo {
        entry { porta[3] = 1; }
        when boton { stop; }
    }
}
";

#[test]
fn blinker_compiles_to_framed_assembly() {
    let asm = compile(BLINKER);

    assert!(asm.starts_with(".text\n"), "missing .text header:\n{}", asm);
    assert!(asm.contains(".global parpadeo"));
    assert!(asm.contains("parpadeo:"));
    assert!(asm.contains("\tbx LR"));

    // La palabra de señales se carga por puntero y la variable
    // regresa de su ranura de pila en algún punto
    assert!(asm.contains("\tldr R"), "no loads at all:\n{}", asm);

    // Las guardas producen comparación y salto condicional
    assert!(asm.contains("\tcmp R"));
    assert!(asm.contains("\tbne L") || asm.contains("\tbeq L"));
}

#[test]
fn source_positions_appear_as_comments() {
    let asm = compile(BLINKER);
    assert!(
        asm.contains("@ test.ioml:"),
        "missing position comments:\n{}",
        asm
    );
}

#[test]
fn every_referenced_label_is_printed_once() {
    let asm = compile(BLINKER);

    let mut defined = std::collections::HashMap::new();
    for line in asm.lines() {
        if let Some(label) = line.strip_suffix(':') {
            if label.starts_with('L') {
                *defined.entry(label.to_string()).or_insert(0) += 1;
            }
        }
    }

    for (label, count) in &defined {
        assert_eq!(*count, 1, "label {} printed {} times", label, count);
    }

    // Todo salto del código refiere a una etiqueta presente
    for line in asm.lines() {
        if let Some(rest) = line.trim_start().strip_prefix("b") {
            if let Some(target) = rest.split_whitespace().last() {
                if target.starts_with('L') && target[1..].chars().all(|c| c.is_ascii_digit()) {
                    assert!(
                        defined.contains_key(target),
                        "branch to undefined {}:\n{}",
                        target,
                        asm
                    );
                }
            }
        }
    }
}

#[test]
fn constant_folding_reaches_the_output() {
    let asm = compile(
        "var x;\n\
         auto a { init { x = 3 + 4 * 5; } }\n",
    );

    assert!(asm.contains("#23"), "23 was not folded:\n{}", asm);
}

#[test]
fn power_of_two_multiply_is_a_shift() {
    let asm = compile(
        "var x;\n\
         var y;\n\
         auto a { init { y = 0; x = y * 8; } }\n",
    );

    assert!(asm.contains("lsl #3"), "no shift by 3:\n{}", asm);
    assert!(!asm.contains("\tmul"), "multiply survived:\n{}", asm);
}

#[test]
fn stopping_branches_to_the_final_label() {
    let asm = compile(
        "reg p = 0x10;\n\
         sig s = p[0];\n\
         auto a {\n\
             init { }\n\
             state w {\n\
                 when s { stop; }\n\
             }\n\
         }\n",
    );

    // El stop del autómata es el único camino al retorno
    assert!(asm.contains("\tbx LR"));
    assert!(asm.contains("\tb L"));
}

#[test]
fn if_else_joins_control_flow() {
    let asm = compile(
        "var x;\n\
         auto a {\n\
             init {\n\
                 x = 0;\n\
                 if x < 10 { x = 1; } else { x = 2; }\n\
             }\n\
         }\n",
    );

    assert!(asm.contains("\tcmp R"));

    // Ambas ramas escriben la variable; su reescritura a pila
    // aparece al cierre de los bloques correspondientes
    assert!(asm.contains("[SP, #-4]"), "no stack traffic:\n{}", asm);
}

#[test]
fn emission_is_byte_identical_across_runs() {
    assert_eq!(compile(BLINKER), compile(BLINKER));
}

#[test]
fn multiple_automata_emit_in_order() {
    let asm = compile(
        "auto first { init { } }\n\
         auto second { init { } }\n",
    );

    let first = asm.find("first:").expect("first missing");
    let second = asm.find("second:").expect("second missing");
    assert!(first < second);
}
