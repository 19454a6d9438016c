//! End-to-end tests: compile a translation unit to TAC and evaluate it
//! through the reference interpreter; the observed result is `main`'s
//! return value.

use mcc::compile_and_run;

fn run(text: &str) -> i32 {
  compile_and_run("test.c", text).expect("pipeline error")
}

#[test]
fn arithmetic_and_precedence() {
  assert_eq!(run("int main(void){ int x=2; int y=3; return x*y+1; }"), 7);
  assert_eq!(run("int main(void){ return 2 + 3 * 4 - 6 / 2; }"), 11);
  assert_eq!(run("int main(void){ return (2 + 3) * 4 % 7; }"), 6);
  assert_eq!(run("int main(void){ return 1 << 4 >> 2; }"), 4);
  assert_eq!(run("int main(void){ return (5 & 3) | (4 ^ 1); }"), 5);
  assert_eq!(run("int main(void){ return -~9; }"), 10);
}

#[test]
fn scoped_shadowing() {
  assert_eq!(run("int main(void){ int x=1; { int x=2; x=x+3; } return x; }"), 1);
  assert_eq!(run("int main(void){ int x=1; { int x=2; } { x = x + 10; } return x; }"), 11);
}

#[test]
fn switch_with_default() {
  let src = "int main(void){ int x=2; int y=0;
    switch(x){ case 1: y=10; break; case 2: y=20; break; default: y=30; break; }
    return y; }";
  assert_eq!(run(src), 20);
  let fallthrough = "int main(void){ int y=0;
    switch(3){ case 3: y=y+1; case 4: y=y+2; break; default: y=100; }
    return y; }";
  assert_eq!(run(fallthrough), 3);
  let no_match = "int main(void){ int y=5;
    switch(9){ case 1: y=1; break; case 2: y=2; break; }
    return y; }";
  assert_eq!(run(no_match), 5);
  let default_only = "int main(void){ switch(1){ default: return 4; } return 0; }";
  assert_eq!(run(default_only), 4);
}

#[test]
fn pointer_subscripting_and_store() {
  assert_eq!(
    run("int main(void){ int a[3]; int *p = a; p[0]=7; p[1]=p[0]+1; return a[0]+a[1]; }"),
    15);
  assert_eq!(
    run("int main(void){ long a[4]; a[0]=1; a[3]=4; return (int)(a[0]+a[3]); }"), 5);
  assert_eq!(
    run("int main(void){ int a[3]; *(a+1) = 9; return a[1]; }"), 9);
  assert_eq!(
    run("int main(void){ int a[3]; a[2] = 5; int *p = a + 2; return *p; }"), 5);
  assert_eq!(
    run("int main(void){ int x = 3; int *p = &x; *p = *p + 4; return x; }"), 7);
  // the arithmetic index may sit on either side of the subscript
  assert_eq!(run("int main(void){ int a[2]; 1[a] = 8; return a[1]; }"), 8);
}

#[test]
fn for_loop_with_continue_and_break() {
  let src = "int main(void){ int s=0;
    for(int i=0;i<5;i=i+1){ if(i==3) continue; s=s+i; if(i==4) break; }
    return s; }";
  assert_eq!(run(src), 7);
  assert_eq!(run("int main(void){ int s=0; for(;;){ s=s+1; if(s==4) break; } return s; }"), 4);
}

#[test]
fn linkage_and_initialization() {
  assert_eq!(
    run("static int g = 41; int f(void){ return g+1; } int main(void){ return f(); }"), 42);
  assert_eq!(
    run("int g; int main(void){ return g; }"), 0);
  assert_eq!(
    run("int g; int g = 9; int main(void){ extern int g; return g; }"), 9);
  // a block-scope static persists across calls
  let counter = "int bump(void){ static int c = 0; c = c + 1; return c; }
    int main(void){ bump(); bump(); return bump(); }";
  assert_eq!(run(counter), 3);
}

#[test]
fn while_and_do_while() {
  assert_eq!(run("int main(void){ int n=0; while(n<7) n=n+1; return n; }"), 7);
  assert_eq!(run("int main(void){ int n=9; do n=n-2; while(n>3); return n; }"), 3);
  assert_eq!(run("int main(void){ int n=0; do n=n+1; while(0); return n; }"), 1,
    "a do-while body runs at least once");
}

#[test]
fn goto_and_labels() {
  let src = "int main(void){ int i=0;
    top: i = i + 1;
    if (i < 5) goto top;
    return i; }";
  assert_eq!(run(src), 5);
  let skip = "int main(void){ int x = 1; goto done; x = 100; done: return x; }";
  assert_eq!(run(skip), 1);
}

#[test]
fn function_calls_and_recursion() {
  let fact = "int fact(int n){ if (n < 2) return 1; return n * fact(n - 1); }
    int main(void){ return fact(5); }";
  assert_eq!(run(fact), 120);
  let fib = "int fib(int n){ return n < 2 ? n : fib(n-1) + fib(n-2); }
    int main(void){ return fib(10); }";
  assert_eq!(run(fib), 55);
  let multi = "int add3(int a, int b, int c){ return a + b + c; }
    int main(void){ return add3(1, 2, 3); }";
  assert_eq!(run(multi), 6);
}

#[test]
fn short_circuit_evaluation() {
  // the right operand must not be evaluated when the left decides
  let and_src = "int g = 0;
    int touch(void){ g = g + 1; return 1; }
    int main(void){ int r = 0 && touch(); return g * 10 + r; }";
  assert_eq!(run(and_src), 0);
  let or_src = "int g = 0;
    int touch(void){ g = g + 1; return 0; }
    int main(void){ int r = 1 || touch(); return g * 10 + r; }";
  assert_eq!(run(or_src), 1);
  assert_eq!(run("int main(void){ return (2 && 3) + (0 || 0); }"), 1);
}

#[test]
fn compound_assignment_and_increment() {
  assert_eq!(run("int main(void){ int x=10; x += 5; x -= 3; x *= 2; x /= 4; return x; }"), 6);
  assert_eq!(run("int main(void){ int x=6; x %= 4; x <<= 3; x >>= 1; return x; }"), 8);
  assert_eq!(run("int main(void){ int x=12; x &= 10; x |= 1; x ^= 2; return x; }"), 11);
  assert_eq!(run("int main(void){ int x=3; int y = x++; return x * 10 + y; }"), 43);
  assert_eq!(run("int main(void){ int x=3; int y = x--; return x * 10 + y; }"), 23);
  assert_eq!(run("int main(void){ int x=3; int y = ++x; return x * 10 + y; }"), 44);
  assert_eq!(run("int main(void){ int x=3; int y = --x; return x * 10 + y; }"), 22);
  assert_eq!(run("int main(void){ int a[2]; a[0]=1; a[1]=10; int *p=a; p++; return *p; }"), 10);
  assert_eq!(run("int main(void){ int a[3]; a[0]=4; int *p=a+2; p -= 2; return *p; }"), 4);
}

#[test]
fn integer_conversions() {
  assert_eq!(run("int main(void){ char c = 300; return c; }"), 44);
  assert_eq!(run("int main(void){ signed char c = 200; return c; }"), -56);
  assert_eq!(run("int main(void){ unsigned char c = 200; return c + 1; }"), 201);
  assert_eq!(run("int main(void){ long l = 2147483647l + 1; return (int)(l >> 31); }"), 1);
  assert_eq!(run("int main(void){ int x = 2147483647; return x + 1 < 0; }"), 1,
    "int arithmetic wraps at 32 bits");
  assert_eq!(run("int main(void){ unsigned u = 0; return u - 1 > 0; }"), 1,
    "unsigned arithmetic wraps modulo 2^32");
  assert_eq!(run("int main(void){ short s = 70000; return s; }"), 4464);
  assert_eq!(run("int main(void){ unsigned short s = 70000; return s; }"), 4464);
  assert_eq!(run("int main(void){ return (int)4294967296l; }"), 0);
}

#[test]
fn char_literals_and_strings() {
  assert_eq!(run("int main(void){ return 'a'; }"), 97);
  assert_eq!(run("int main(void){ return '\\n'; }"), 10);
  assert_eq!(run("int main(void){ char *s = \"abc\"; return s[0] + s[2]; }"), 97 + 99);
  assert_eq!(run("int main(void){ char *s = \"ab\" \"cd\"; return s[3]; }"), 100,
    "adjacent string literals concatenate");
  assert_eq!(run("int main(void){ char *s = \"x\"; return s[1]; }"), 0,
    "string literals carry a terminator");
  assert_eq!(run("int main(void){ char s[6] = \"hello\"; return s[1]; }"), 101);
  assert_eq!(run("int main(void){ char s[8] = \"hi\"; return s[7]; }"), 0,
    "a short string initializer zero-fills the tail");
}

#[test]
fn array_initializers() {
  assert_eq!(run("int main(void){ int a[3] = {5, 6, 7}; return a[0]+a[1]+a[2]; }"), 18);
  assert_eq!(run("int main(void){ int a[4] = {1}; return a[0]+a[1]+a[2]+a[3]; }"), 1,
    "missing elements are zero");
  assert_eq!(run("int main(void){ int a[2][3] = {{1,2,3},{4,5,6}}; return a[1][2]; }"), 6);
  assert_eq!(run("int main(void){ int a[2][2] = {{9}}; return a[0][0]+a[0][1]+a[1][0]; }"), 9);
  assert_eq!(run("int g[3] = {4, 5}; int main(void){ return g[0]+g[1]+g[2]; }"), 9);
  assert_eq!(run("int g[2][2] = {{1,2},{3,4}}; int main(void){ return g[1][0]; }"), 3);
}

#[test]
fn conditional_expression() {
  assert_eq!(run("int main(void){ return 1 ? 4 : 5; }"), 4);
  assert_eq!(run("int main(void){ return 0 ? 4 : 5; }"), 5);
  assert_eq!(run("int main(void){ int x = 7; return x > 5 ? x - 5 : 5 - x; }"), 2);
  // only the chosen branch is evaluated
  let src = "int g = 0;
    int touch(int v){ g = v; return v; }
    int main(void){ int r = 1 ? 8 : touch(9); return g * 100 + r; }";
  assert_eq!(run(src), 8);
}

#[test]
fn comparisons_are_int_valued() {
  assert_eq!(run("int main(void){ return (3 < 5) + (5 <= 5) + (6 > 5) + (5 >= 7); }"), 3);
  assert_eq!(run("int main(void){ return (2 == 2) + (2 != 2); }"), 1);
  assert_eq!(run("int main(void){ int a[2]; int *p = a; return p == a; }"), 1);
  assert_eq!(run("int main(void){ int a[2]; int *p = a + 1; return p != 0; }"), 1);
  assert_eq!(run("int main(void){ return !5 + !0; }"), 1);
}

#[test]
fn unsigned_semantics() {
  assert_eq!(run("int main(void){ unsigned u = 4294967295u; return u > 5u; }"), 1);
  assert_eq!(run("int main(void){ unsigned u = 7u; return (int)(u / 2u); }"), 3);
  assert_eq!(run("int main(void){ return -1 < 1u; }"), 0,
    "int converts to unsigned at equal width");
  assert_eq!(run("int main(void){ long l = -1; return l < 1u; }"), 1,
    "the wider signed type absorbs a narrower unsigned one");
  assert_eq!(run("int main(void){ unsigned u = 0u - 1u; return (int)(u >> 28); }"), 15);
}

#[test]
fn extern_and_forward_declarations() {
  let src = "int helper(int);
    int main(void){ return helper(20); }
    int helper(int x){ return x * 2; }";
  assert_eq!(run(src), 40);
  let ext = "extern int g; int main(void){ return g + 1; } int g = 5;";
  assert_eq!(run(ext), 6);
  let local_extern = "int g = 12; int main(void){ extern int g; return g; }";
  assert_eq!(run(local_extern), 12);
}

#[test]
fn constant_folding_matches_execution() {
  // the folded value of a constant initializer and the evaluated TAC of
  // the same expression agree
  let cases: &[(&str, i32)] = &[
    ("7 / 2", 3),
    ("-7 / 2", -3),
    ("7 % 3", 1),
    ("1 << 10", 1024),
    ("(char)300", 44),
    ("2147483647 + 1", i32::MIN),
    ("(int)(4294967290u > 5u)", 1),
    ("-1 < 1 ? 10 : 20", 10),
    ("~0 + 2", 1),
  ];
  for &(expr, expected) in cases {
    let as_global = format!("int g = {expr}; int main(void){{ return g; }}");
    let as_computed = format!("int main(void){{ int x = {expr}; return x; }}");
    assert_eq!(run(&as_global), expected, "folded `{expr}`");
    assert_eq!(run(&as_computed), expected, "computed `{expr}`");
  }
}

#[test]
fn nested_control_flow() {
  let src = "int main(void){
    int total = 0;
    for (int i = 0; i < 4; i = i + 1) {
      int j = 0;
      while (j < 4) {
        j = j + 1;
        if (j == i) continue;
        if (j == 3 && i == 3) break;
        total = total + 1;
      }
    }
    return total; }";
  // i=0 counts j=1..4; each later i skips j==i (for i=3 the continue
  // fires before the break is reached), so i=1,2,3 count 3 each
  assert_eq!(run(src), 13);
  let switch_in_loop = "int main(void){
    int acc = 0;
    for (int i = 0; i < 5; i = i + 1) {
      switch (i % 3) {
        case 0: acc += 1; break;
        case 1: acc += 10; break;
        default: acc += 100; break;
      }
    }
    return acc; }";
  assert_eq!(run(switch_in_loop), 122);
}

#[test]
fn dereference_chains() {
  assert_eq!(run("int main(void){ int x = 5; int *p = &x; int **q = &p; return **q; }"), 5);
  assert_eq!(
    run("int main(void){ int x = 1; int *p = &x; int **q = &p; **q = 9; return x; }"), 9);
}

#[test]
fn missing_return_in_main_is_zero() {
  assert_eq!(run("int main(void){ int x = 5; x = x + 1; }"), 0);
  assert_eq!(run("int main(void){ }"), 0);
}

#[test]
fn void_functions() {
  let src = "int g = 0;
    void set(int v){ g = v; return; }
    int main(void){ set(13); return g; }";
  assert_eq!(run(src), 13);
  let early = "int g = 0;
    void set(int v){ if (v > 10) return; g = v; }
    int main(void){ set(50); set(3); return g; }";
  assert_eq!(run(early), 3);
}

#[test]
fn result_is_projected_to_32_bits() {
  assert_eq!(run("int main(void){ return (int)4294967297l; }"), 1);
  assert_eq!(run("long main(void){ return 4294967297l; }"), 1,
    "the 64-bit pattern projects to its low 32 bits");
}

#[test]
fn dangling_else_binds_to_the_nearest_if() {
  let src = "int main(void){ int x = 0;
    if (1) if (0) x = 1; else x = 2;
    return x; }";
  assert_eq!(run(src), 2);
  let outer_false = "int main(void){ int x = 9;
    if (0) if (1) x = 1; else x = 2;
    return x; }";
  assert_eq!(run(outer_false), 9);
}

#[test]
fn signed_arithmetic_truncates_toward_zero() {
  assert_eq!(run("int main(void){ return -7 / 2; }"), -3);
  assert_eq!(run("int main(void){ return -7 % 3; }"), -1);
  assert_eq!(run("int main(void){ return 7 % -3; }"), 1);
  assert_eq!(run("int main(void){ return -8 >> 1; }"), -4, "signed shift is arithmetic");
  assert_eq!(run("int main(void){ unsigned u = 0u - 8u; return (int)(u >> 29); }"), 7,
    "unsigned shift is logical");
}

#[test]
fn do_while_continue_reevaluates_the_condition() {
  let src = "int main(void){ int n = 0; int seen = 0;
    do { n = n + 1; if (n < 3) continue; seen = seen + 1; } while (n < 5);
    return n * 10 + seen; }";
  // n runs 1..5; the body tail executes for n = 3, 4, 5
  assert_eq!(run(src), 53);
}

#[test]
fn conditional_with_pointer_branches() {
  let src = "int main(void){ int x = 8; int *p = &x;
    int *q = p ? p : 0;
    return q == p; }";
  assert_eq!(run(src), 1);
  let null_side = "int main(void){ int *p = 0;
    int *q = p ? p : 0;
    return q == 0; }";
  assert_eq!(run(null_side), 1);
}

#[test]
fn byte_access_through_a_casted_pointer() {
  // 16909060 is 0x01020304: little-endian byte order is observable
  let src = "int main(void){ int x = 16909060;
    char *p = (char*)&x;
    return p[0] * 100 + p[1]; }";
  assert_eq!(run(src), 4 * 100 + 3);
  let store_side = "int main(void){ int x = 0;
    char *p = (char*)&x;
    p[0] = 5;
    return x; }";
  assert_eq!(run(store_side), 5);
}

#[test]
fn while_loops_guard_before_the_first_iteration() {
  assert_eq!(run("int main(void){ int n = 0; while (0) n = 99; return n; }"), 0);
  assert_eq!(run("int main(void){ int n = 3; while (n) n = n - 1; return n; }"), 0);
}

#[test]
fn chained_and_nested_calls() {
  let src = "
    int inc(int x) { return x + 1; }
    int twice(int x) { return x * 2; }
    int main(void) { return twice(inc(twice(inc(3)))); }";
  // 3 -> 4 -> 8 -> 9 -> 18
  assert_eq!(run(src), 18);
}
